use clap::Parser;

/// volsync-operator config
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The namespace to watch, default to cluster wide
    #[arg(long, value_parser = namespace_mode_parser, default_value = "")]
    pub namespace: Namespace,
    /// The address on which the metrics HTTP server will listen
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen_addr: String,
    /// Whether to create the CRDs regardless of what version is already on
    /// the cluster
    #[arg(long, default_value = "false")]
    pub create_crd: bool,
}

/// The namespace to watch, `ClusterWide` means every namespace
#[derive(Clone, Debug)]
pub enum Namespace {
    /// A single namespace
    Single(String),
    /// All namespaces
    ClusterWide,
}

/// parse namespace mode
fn namespace_mode_parser(value: &str) -> Result<Namespace, String> {
    if value.is_empty() {
        return Ok(Namespace::ClusterWide);
    }
    Ok(Namespace::Single(value.to_owned()))
}
