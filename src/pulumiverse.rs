//! The provider universe: which providers have first-class PCL packages and
//! which must be dynamically bridged, plus the handful whose package names
//! differ from their TF provider names.

/// Returns true if and only if the given provider name is *not* a known
/// package, meaning it must be dynamically bridged. The name must already be
/// the package name, not the TF provider name.
pub fn is_terraform_provider(name: &str) -> bool {
    !SUPPORTED_PROVIDERS.contains(&name)
}

/// TF provider names whose packages are published under a different name.
pub fn renamed_provider(tf_name: &str) -> Option<&'static str> {
    match tf_name {
        "azurerm" => Some("azure"),
        "bigip" => Some("f5bigip"),
        "google" => Some("gcp"),
        "template" => Some("terraform-template"),
        _ => None,
    }
}

static SUPPORTED_PROVIDERS: &[&str] = &[
    "acme",
    "aiven",
    "akamai",
    "alicloud",
    "aquasec",
    "archive",
    "artifactory",
    "astra",
    "auth0",
    "aws",
    "aws-eksa",
    "azure",
    "azuread",
    "azuredevops",
    "buildkite",
    "cloudamqp",
    "cloudflare",
    "cloudinit",
    "cloudngfwaws",
    "concourse",
    "configcat",
    "confluentcloud",
    "consul",
    "databricks",
    "datadog",
    "dbtcloud",
    "digitalocean",
    "dnsimple",
    "docker",
    "doppler",
    "ec",
    "exoscale",
    "external",
    "f5bigip",
    "fastly",
    "gandi",
    "gcp",
    "github",
    "github-credentials",
    "gitlab",
    "googleworkspace",
    "harbor",
    "harness",
    "hcloud",
    "hcp",
    "heroku",
    "http",
    "ise",
    "junipermist",
    "kafka",
    "keycloak",
    "kong",
    "kubernetes",
    "linode",
    "mailgun",
    "matchbox",
    "meraki",
    "minio",
    "mongodbatlas",
    "mssql",
    "mysql",
    "newrelic",
    "ngrok",
    "nomad",
    "ns1",
    "null",
    "oci",
    "okta",
    "openstack",
    "opsgenie",
    "pagerduty",
    "postgresql",
    "purrl",
    "rabbitmq",
    "rancher2",
    "random",
    "scm",
    "sdwan",
    "sentry",
    "signalfx",
    "slack",
    "snowflake",
    "splunk",
    "spotinst",
    "statuscake",
    "sumologic",
    "tailscale",
    "tf-provider-boilerplate",
    "time",
    "tls",
    "unifi",
    "vault",
    "venafi",
    "vra",
    "vsphere",
    "wavefront",
    "xyz",
    "zitadel",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_providers_are_not_bridged() {
        assert!(!is_terraform_provider("aws"));
        assert!(!is_terraform_provider("gcp"));
        assert!(is_terraform_provider("planetscale"));
    }

    #[test]
    fn renames() {
        assert_eq!(renamed_provider("google"), Some("gcp"));
        assert_eq!(renamed_provider("azurerm"), Some("azure"));
        assert_eq!(renamed_provider("aws"), None);
    }
}
