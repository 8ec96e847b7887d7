//! `options` block parsing

use super::value::{first_string, strings};
use crate::error::{BuildError, Result};
use crate::model::{NetworkSelector, StackOptions};
use kdl::KdlNode;
use tracing::warn;

pub fn parse_options(node: &KdlNode, options: &mut StackOptions) -> Result<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        let name = child.name().value();
        let string = || {
            first_string(child).map(str::to_string).ok_or_else(|| {
                BuildError::InvalidDeclaration(format!("option {} requires a string", name))
            })
        };

        match name {
            "vpc-id" => options.network = Some(NetworkSelector::VpcId(string()?)),
            "is-default" => options.network = Some(NetworkSelector::Default),
            "subnets" => options.subnets = strings(child)?,
            "domain-name" => options.domain_name = Some(string()?),
            "main-domain-name" => options.main_domain_name = Some(string()?),
            "instance-type" => options.instance_type = Some(string()?),
            "instance-class" => options.instance_class = Some(string()?),
            "ami" | "ami-reference" => options.ami_reference = Some(string()?),
            "key-name" => options.key_name = Some(string()?),
            "region" => options.region = Some(string()?),
            "edge-region" => options.edge_region = Some(string()?),
            other => warn!(option = other, "Ignoring unknown stack option"),
        }
    }

    Ok(())
}
