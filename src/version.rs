//! Version numbers and requirement constraints in the TF dialect, including
//! the pessimistic `~>` operator. Registry module selection and provider
//! parameterization both resolve through these.

use anyhow::{bail, Result};
use std::cmp::Ordering;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: String,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: String::new(),
        }
    }

    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    fn numbers(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numbers()
            .cmp(&other.numbers())
            // A release sorts after any prerelease of the same number.
            .then_with(|| self.pre.is_empty().cmp(&other.pre.is_empty()))
            .then_with(|| self.pre.cmp(&other.pre))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Version {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().trim_start_matches('v');
        let (nums, pre) = match s.split_once('-') {
            Some((nums, pre)) => (nums, pre.to_string()),
            None => (s, String::new()),
        };
        let mut parts = nums.split('.');
        let mut next = |required: bool| -> Result<u64> {
            match parts.next() {
                Some(p) => p
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid version component '{p}' in '{s}'")),
                None if required => bail!("empty version '{s}'"),
                None => Ok(0),
            }
        };
        let major = next(true)?;
        let minor = next(false)?;
        let patch = next(false)?;
        if parts.next().is_some() {
            bail!("too many version components in '{s}'");
        }
        Ok(Version {
            major,
            minor,
            patch,
            pre,
        })
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            write!(f, "-{}", self.pre)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Pessimistic,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Constraint {
    pub op: ConstraintOp,
    pub version: Version,
    /// How many components the constraint spelled out; `~>` bumps the
    /// second-to-last one.
    precision: usize,
}

impl Constraint {
    pub fn check(&self, v: &Version) -> bool {
        match self.op {
            ConstraintOp::Eq => v == &self.version,
            ConstraintOp::Ne => v != &self.version,
            ConstraintOp::Gt => v > &self.version,
            ConstraintOp::Ge => v >= &self.version,
            ConstraintOp::Lt => v < &self.version,
            ConstraintOp::Le => v <= &self.version,
            ConstraintOp::Pessimistic => {
                if v < &self.version {
                    return false;
                }
                let upper = if self.precision >= 3 {
                    Version::new(self.version.major, self.version.minor + 1, 0)
                } else {
                    Version::new(self.version.major + 1, 0, 0)
                };
                v < &upper
            }
        }
    }
}

impl FromStr for Constraint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (op, rest) = if let Some(rest) = s.strip_prefix("~>") {
            (ConstraintOp::Pessimistic, rest)
        } else if let Some(rest) = s.strip_prefix(">=") {
            (ConstraintOp::Ge, rest)
        } else if let Some(rest) = s.strip_prefix("<=") {
            (ConstraintOp::Le, rest)
        } else if let Some(rest) = s.strip_prefix("!=") {
            (ConstraintOp::Ne, rest)
        } else if let Some(rest) = s.strip_prefix('>') {
            (ConstraintOp::Gt, rest)
        } else if let Some(rest) = s.strip_prefix('<') {
            (ConstraintOp::Lt, rest)
        } else if let Some(rest) = s.strip_prefix('=') {
            (ConstraintOp::Eq, rest)
        } else {
            (ConstraintOp::Eq, s)
        };
        let rest = rest.trim();
        let precision = rest.split('-').next().unwrap_or(rest).split('.').count();
        Ok(Constraint {
            op,
            version: rest.parse()?,
            precision,
        })
    }
}

/// A comma-separated list of constraints; all must hold. The empty list
/// matches every version.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Constraints(pub Vec<Constraint>);

impl Constraints {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }
        let mut constraints = Vec::new();
        for part in s.split(',') {
            constraints.push(part.parse()?);
        }
        Ok(Self(constraints))
    }

    pub fn check(&self, v: &Version) -> bool {
        self.0.iter().all(|c| c.check(v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The concrete version pinned by an exact constraint, if there is one,
    /// else the lower bound of the first constraint. Used when a requirement
    /// has to be collapsed to a single version without asking a registry.
    pub fn base_version(&self) -> Option<&Version> {
        self.0
            .iter()
            .find(|c| c.op == ConstraintOp::Eq)
            .or_else(|| self.0.first())
            .map(|c| &c.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn parses_and_orders_versions() {
        assert_eq!(v("1.2"), Version::new(1, 2, 0));
        assert_eq!(v("v0.70.0"), Version::new(0, 70, 0));
        assert!(v("1.2.3") < v("1.2.4"));
        assert!(v("1.10.0") > v("1.9.9"));
        assert!(v("1.2.3-beta") < v("1.2.3"));
        assert!(v("1.2.3-alpha") < v("1.2.3-beta"));
        assert!("1.x".parse::<Version>().is_err());
    }

    #[test]
    fn prerelease_detection() {
        assert!(v("1.0.0-rc1").is_prerelease());
        assert!(!v("1.0.0").is_prerelease());
    }

    #[test]
    fn pessimistic_constraint_two_components() {
        let c = Constraints::parse("~> 1.2").unwrap();
        assert!(c.check(&v("1.2.0")));
        assert!(c.check(&v("1.9.9")));
        assert!(!c.check(&v("2.0.0")));
        assert!(!c.check(&v("1.1.9")));
    }

    #[test]
    fn pessimistic_constraint_three_components() {
        let c = Constraints::parse("~> 1.2.3").unwrap();
        assert!(c.check(&v("1.2.3")));
        assert!(c.check(&v("1.2.9")));
        assert!(!c.check(&v("1.3.0")));
    }

    #[test]
    fn constraint_lists_require_all() {
        let c = Constraints::parse(">= 1.2, < 2.0").unwrap();
        assert!(c.check(&v("1.5.0")));
        assert!(!c.check(&v("2.0.0")));
        assert!(!c.check(&v("1.1.0")));
    }

    #[test]
    fn empty_constraints_match_everything() {
        let c = Constraints::parse("").unwrap();
        assert!(c.check(&v("99.0.0")));
        assert!(c.is_empty());
    }

    #[test]
    fn base_version_prefers_exact_pins() {
        let c = Constraints::parse(">= 0.1, = 0.1.4").unwrap();
        assert_eq!(c.base_version().unwrap().to_string(), "0.1.4");
        let c = Constraints::parse("~> 2.1").unwrap();
        assert_eq!(c.base_version().unwrap().to_string(), "2.1.0");
    }
}
