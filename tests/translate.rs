use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tf2pcl::mapper::{Mapper, MapperPackageHint};
use tf2pcl::parser::RegistrySource;
use tf2pcl::translate::{translate_module_with, Externals, PackageFetcher, RegistryClient};
use tf2pcl::version::Version;
use tf2pcl::{translate_module, MapperProviderInfoSource, MemoryFs, Severity, Vfs};

/// A mapper serving canned payloads; providers with no entry have no
/// mapping.
struct MapMapper {
    payloads: HashMap<String, Vec<u8>>,
}

impl MapMapper {
    fn empty() -> Self {
        Self {
            payloads: HashMap::new(),
        }
    }

    fn with_aws() -> Self {
        let mut payloads = HashMap::new();
        payloads.insert(
            "aws".to_string(),
            br#"{
                "name": "aws",
                "resources": {
                    "aws_instance": {
                        "tok": "aws:index:Instance",
                        "fields": {
                            "ami": {"type": "string"},
                            "tags": {"type": "map", "elem": {"schema": {"type": "string"}}},
                            "root_block_device": {
                                "type": "list",
                                "maxItems": 1,
                                "elem": {"resource": {"volume_size": {"type": "number"}}}
                            }
                        }
                    }
                },
                "dataSources": {
                    "aws_ami": {
                        "tok": "aws:index:getAmi",
                        "fields": {
                            "most_recent": {"type": "bool"}
                        }
                    }
                },
                "config": {
                    "region": {"name": "region"}
                }
            }"#
            .to_vec(),
        );
        Self { payloads }
    }
}

impl Mapper for MapMapper {
    fn get_mapping(&self, provider: &str, _hint: Option<&MapperPackageHint>) -> Result<Vec<u8>> {
        Ok(self.payloads.get(provider).cloned().unwrap_or_default())
    }
}

fn translate(files: &[(&str, &str)], mapper: MapMapper) -> (MemoryFs, tf2pcl::Diagnostics) {
    let source = MemoryFs::with_files(files.iter().map(|(p, s)| (p.to_string(), s.to_string())));
    let destination = MemoryFs::new();
    let info = MapperProviderInfoSource::new(Box::new(mapper));
    let diagnostics = translate_module(
        &source,
        Path::new("/"),
        &destination,
        &info,
        Path::new("/"),
    );
    (destination, diagnostics)
}

fn read(fs: &MemoryFs, path: &str) -> String {
    fs.read_to_string(Path::new(path))
        .unwrap_or_else(|_| panic!("missing {path}: have {:?}", fs.paths()))
}

#[test]
fn empty_module_produces_no_files() {
    let (destination, diagnostics) = translate(&[("/main.tf", "")], MapMapper::empty());
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    assert!(destination.paths().is_empty());
}

#[test]
fn unknown_provider_translates_with_a_warning() {
    let (destination, diagnostics) = translate(
        &[("/main.tf", "resource aws_bucket foo { }")],
        MapMapper::empty(),
    );
    assert_eq!(
        read(&destination, "/main.pp"),
        "resource \"foo\" \"aws:index:bucket\" {}\n"
    );
    assert_eq!(diagnostics.len(), 1);
    let diag = &diagnostics.0[0];
    assert_eq!(diag.severity, Severity::Warning);
    assert_eq!(diag.summary, "Failed to get provider info");
    assert!(diag.detail.contains("aws_bucket"));
}

#[test]
fn full_program_translates_declarations_in_source_order() {
    let program = r#"
variable "instance_type" {
  type    = string
  default = "t2.micro"
}

locals {
  common_name = "${var.instance_type}-web"
}

data "aws_ami" "ubuntu" {
  most_recent = true
}

resource "aws_instance" "web" {
  ami = data.aws_ami.ubuntu.id
  tags = {
    Environment = "prod"
  }
  root_block_device {
    volume_size = 20
  }
}

output "instance_id" {
  value = aws_instance.web.id
}
"#;
    let (destination, diagnostics) = translate(&[("/main.tf", program)], MapMapper::with_aws());
    assert!(!diagnostics.has_errors(), "{diagnostics:?}");

    let out = read(&destination, "/main.pp");
    assert!(out.contains("config \"instanceType\" \"string\""), "{out}");
    assert!(out.contains("default = \"t2.micro\""), "{out}");
    assert!(out.contains("commonName = \"${instanceType}-web\""), "{out}");
    assert!(out.contains("invoke(\"aws:index:getAmi\""), "{out}");
    assert!(out.contains("mostRecent = true"), "{out}");
    assert!(out.contains("resource \"web\" \"aws:index:Instance\""), "{out}");
    assert!(out.contains("ami = ubuntu.id"), "{out}");
    // Map-typed tags keep their keys.
    assert!(out.contains("Environment = \"prod\""), "{out}");
    // MaxItemsOne block becomes a single object attribute.
    assert!(out.contains("rootBlockDevice = {"), "{out}");
    assert!(out.contains("volumeSize = 20"), "{out}");
    assert!(out.contains("output \"instanceId\""), "{out}");
    assert!(out.contains("value = web.id"), "{out}");

    // Declarations appear in source order.
    let config_at = out.find("config \"instanceType\"").unwrap();
    let local_at = out.find("commonName =").unwrap();
    let data_at = out.find("ubuntu =").unwrap();
    let resource_at = out.find("resource \"web\"").unwrap();
    let output_at = out.find("output \"instanceId\"").unwrap();
    assert!(config_at < local_at && local_at < data_at, "{out}");
    assert!(data_at < resource_at && resource_at < output_at, "{out}");
}

#[test]
fn package_blocks_are_emitted_in_order_for_required_providers() {
    let program = r#"
terraform {
  required_providers {
    planetscale = {
      source  = "planetscale/planetscale"
      version = "0.1.0"
    }
    aws = {
      source  = "hashicorp/aws"
      version = "~> 5.0"
    }
    google = {
      source = "hashicorp/google"
    }
  }
}

resource "aws_instance" "web" {
}
"#;
    let (destination, _) = translate(&[("/main.tf", program)], MapMapper::with_aws());
    let out = read(&destination, "/main.pp");

    let aws_at = out.find("package \"aws\"").expect(&out);
    let gcp_at = out.find("package \"gcp\"").expect(&out);
    let planetscale_at = out.find("package \"planetscale\"").expect(&out);
    assert!(aws_at < gcp_at && gcp_at < planetscale_at, "{out}");

    // The unbridged provider is parameterized.
    assert!(out.contains("baseProviderName = \"terraform-provider\""), "{out}");
    assert!(out.contains("baseProviderVersion = \"0.8.1\""), "{out}");
    assert!(out.contains("parameterization {"), "{out}");

    // Known providers carry just a base name.
    assert!(out.contains("baseProviderName = \"aws\""), "{out}");
}

#[test]
fn provider_configs_become_the_project_manifest() {
    let program = r#"
locals {
  zone = "us-east-1a"
}

provider "aws" {
  region      = "us-east-1"
  zone        = local.zone
  max_retries = 3
  token       = var.secret_token
}
"#;
    let (destination, diagnostics) = translate(&[("/main.tf", program)], MapMapper::with_aws());

    let yaml = read(&destination, "/Pulumi.yaml");
    assert!(yaml.contains("runtime: terraform"), "{yaml}");
    assert!(yaml.contains("aws:region: us-east-1"), "{yaml}");
    assert!(yaml.contains("aws:zone: us-east-1a"), "{yaml}");
    assert!(yaml.contains("aws:maxRetries: 3"), "{yaml}");
    // Inevaluable expressions degrade to an explicit TODO value.
    assert!(yaml.contains("aws:token"), "{yaml}");
    assert!(yaml.contains("TODO: var.secret_token"), "{yaml}");
    assert!(diagnostics
        .iter()
        .any(|d| d.summary == "Failed to evaluate provider config"));
}

#[test]
fn aliased_providers_are_ignored_with_a_warning() {
    let program = "provider \"aws\" {\n  alias  = \"west\"\n  region = \"us-west-2\"\n}\n";
    let (destination, diagnostics) = translate(&[("/main.tf", program)], MapMapper::with_aws());
    assert!(diagnostics
        .iter()
        .any(|d| d.summary == "Provider alias not supported"));
    assert!(destination
        .read_to_string(Path::new("/Pulumi.yaml"))
        .is_err());
}

#[test]
fn local_modules_translate_once_and_dedupe_relative_spellings() {
    let files = [
        (
            "/main.tf",
            r#"
module "first" {
  source = "./consumer"
  name   = "a"
}

module "second" {
  source = "././consumer"
  name   = "b"
}
"#,
        ),
        (
            "/consumer/main.tf",
            r#"
variable "name" {}

output "greeting" {
  value = var.name
}
"#,
        ),
    ];
    let (destination, diagnostics) = translate(&files, MapMapper::empty());
    assert!(!diagnostics.has_errors(), "{diagnostics:?}");

    let out = read(&destination, "/main.pp");
    assert!(out.contains("component \"firstComponent\" \"./consumer\"")
        || out.contains("component \"first\" \"./consumer\""), "{out}");
    // Both calls point at the same translated directory.
    assert_eq!(out.matches("\"./consumer\"").count(), 2, "{out}");

    let consumer = read(&destination, "/consumer/main.pp");
    assert!(consumer.contains("config \"name\""), "{consumer}");
    assert!(consumer.contains("output \"greeting\""), "{consumer}");
    // The nested module does not repeat the package blocks.
    assert!(!consumer.contains("package "), "{consumer}");
}

#[test]
fn sandboxed_local_modules_stay_opaque() {
    let files = [
        (
            "/main.tf",
            r#"
# @module vpcmod
module "my_vpc" {
  source     = "./vpc"
  cidr_block = "10.0.0.0/16"
}
"#,
        ),
        ("/vpc/main.tf", "variable \"cidr_block\" {}\n"),
    ];
    let (destination, diagnostics) = translate(&files, MapMapper::empty());
    assert!(!diagnostics.has_errors(), "{diagnostics:?}");

    let out = read(&destination, "/main.pp");
    assert!(out.contains("resource \"myVpc\" \"vpcmod:index:Module\""), "{out}");
    assert!(out.contains("package \"vpcmod\""), "{out}");
    assert!(out.contains("baseProviderName = \"terraform-module\""), "{out}");
    assert!(out.contains("baseProviderVersion = \"0.1.4\""), "{out}");
    // Inputs keep their casing.
    assert!(out.contains("cidr_block = \"10.0.0.0/16\""), "{out}");
    // The module itself is not inlined.
    assert!(destination
        .read_to_string(Path::new("/vpc/main.pp"))
        .is_err());
}

struct TempDirFetcher {
    dir: PathBuf,
}

impl PackageFetcher for TempDirFetcher {
    fn fetch_package(&self, _addr: &str) -> Result<PathBuf> {
        Ok(self.dir.clone())
    }
}

struct FixedRegistry {
    versions: Vec<Version>,
}

impl RegistryClient for FixedRegistry {
    fn module_versions(&self, _source: &RegistrySource) -> Result<Vec<Version>> {
        Ok(self.versions.clone())
    }

    fn module_location(&self, _source: &RegistrySource, _version: &Version) -> Result<String> {
        Ok("git::https://example.com/modules/vpc.git".to_string())
    }
}

#[test]
fn registry_modules_resolve_to_the_highest_matching_release() {
    let module_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        module_dir.path().join("main.tf"),
        "variable \"cidr\" {}\n\noutput \"cidr\" {\n  value = var.cidr\n}\n",
    )
    .unwrap();

    let source = MemoryFs::with_files([(
        "/main.tf",
        r#"
module "vpc" {
  source  = "terraform-aws-modules/vpc/aws"
  version = "~> 1.0"
  cidr    = "10.0.0.0/16"
}
"#,
    )]);
    let destination = MemoryFs::new();
    let info = MapperProviderInfoSource::new(Box::new(MapMapper::empty()));
    let fetcher = TempDirFetcher {
        dir: module_dir.path().to_path_buf(),
    };
    let registry = FixedRegistry {
        versions: vec![
            "1.0.0".parse().unwrap(),
            "1.2.0".parse().unwrap(),
            // Prereleases are skipped even when newer.
            "1.3.0-beta".parse().unwrap(),
            // Out of range for the requirement.
            "2.0.0".parse().unwrap(),
        ],
    };

    let diagnostics = translate_module_with(
        &source,
        Path::new("/"),
        &destination,
        &info,
        Path::new("/"),
        Externals {
            fetcher: &fetcher,
            registry: &registry,
        },
    );
    assert!(!diagnostics.has_errors(), "{diagnostics:?}");

    let out = read(&destination, "/main.pp");
    assert!(out.contains("component \"vpcComponent\" \"./vpc_1.2.0\"")
        || out.contains("component \"vpc\" \"./vpc_1.2.0\""), "{out}");

    let translated = read(&destination, "/vpc_1.2.0/main.pp");
    assert!(translated.contains("config \"cidr\""), "{translated}");
}

#[test]
fn remote_and_registry_modules_error_without_externals() {
    let (_, diagnostics) = translate(
        &[(
            "/main.tf",
            "module \"vpc\" {\n  source = \"terraform-aws-modules/vpc/aws\"\n}\n",
        )],
        MapMapper::empty(),
    );
    assert!(diagnostics.has_errors(), "{diagnostics:?}");
    assert!(diagnostics
        .iter()
        .any(|d| d.summary == "Error accessing remote module registry"));
}

#[test]
fn translation_is_deterministic() {
    let program = r#"
variable "name" {
  default = "web"
}

resource "aws_instance" "web" {
  ami = var.name
  tags = {
    Environment = "prod"
  }
}

provider "aws" {
  region = "us-east-1"
}

output "id" {
  value = aws_instance.web.id
}
"#;
    let run = || {
        let (destination, _) = translate(&[("/main.tf", program)], MapMapper::with_aws());
        destination
            .paths()
            .into_iter()
            .map(|p| {
                let contents = destination.read_to_string(&p).unwrap();
                (p, contents)
            })
            .collect::<Vec<_>>()
    };
    let first = run();
    let second = run();
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn renamed_resources_keep_their_logical_name() {
    let program = "resource \"aws_instance\" \"my_server\" {\n  ami = \"abc\"\n}\n";
    let (destination, _) = translate(&[("/main.tf", program)], MapMapper::with_aws());
    let out = read(&destination, "/main.pp");
    assert!(out.contains("resource \"myServer\" \"aws:index:Instance\""), "{out}");
    assert!(out.contains("__logicalName = \"my_server\""), "{out}");
}

#[test]
fn comments_ride_along_with_declarations() {
    let program = r#"
# the web server
resource "aws_instance" "web" {
  ami = "abc"
}
"#;
    let (destination, _) = translate(&[("/main.tf", program)], MapMapper::with_aws());
    let out = read(&destination, "/main.pp");
    let comment_at = out.find("# the web server").expect(&out);
    let resource_at = out.find("resource \"web\"").unwrap();
    assert!(comment_at < resource_at, "{out}");
}

#[test]
fn multiple_files_map_to_multiple_outputs() {
    let files = [
        ("/one.tf", "resource \"aws_instance\" \"a\" {}\n"),
        ("/two.tf", "resource \"aws_instance\" \"b\" {}\n"),
    ];
    let (destination, _) = translate(&files, MapMapper::with_aws());
    assert!(read(&destination, "/one.pp").contains("resource \"a\""));
    assert!(read(&destination, "/two.pp").contains("resource \"b\""));
}
