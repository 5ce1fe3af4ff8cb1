//! Renders the gamenet CRD schemas to YAML on stdout.

use crds::{DedicatedLoadBalancer, ElasticIP, GameServerSet};
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&GameServerSet::crd())?);
    println!("---");
    print!("{}", serde_yaml::to_string(&DedicatedLoadBalancer::crd())?);
    println!("---");
    print!("{}", serde_yaml::to_string(&ElasticIP::crd())?);
    Ok(())
}
