//! Prints the `ReplicationSource`/`ReplicationDestination` CRD YAML to
//! stdout, for `kubectl apply -f <(crdgen)` or committing into a deploy
//! manifest. Does not touch a cluster.

use anyhow::Result;
use kube::CustomResourceExt;

use crd_api::{ReplicationDestination, ReplicationSource};

fn main() -> Result<()> {
    print_crd(ReplicationSource::crd())?;
    print_crd(ReplicationDestination::crd())?;
    Ok(())
}

fn print_crd(
    crd: k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition,
) -> Result<()> {
    println!("---");
    println!("{}", serde_yaml::to_string(&crd)?);
    Ok(())
}
