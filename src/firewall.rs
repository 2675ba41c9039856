//! Firewall store backed by an AWS EC2 security group.
//!
//! Only rules carrying the managed description on the managed tcp port are
//! ever read or touched; anything else in the group is invisible to this
//! tool.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ec2::config::Region;
use aws_sdk_ec2::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_ec2::types::{IpPermission, IpRange};
use aws_sdk_ec2::Client;
use ipnet::Ipv4Net;
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::canon::CanonicalSet;

/// A single rule mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOp {
    Revoke,
    Authorize,
}

impl fmt::Display for RuleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleOp::Revoke => write!(f, "revoke"),
            RuleOp::Authorize => write!(f, "authorize"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read rules of {group}: {message}")]
    Read { group: String, message: String },
    #[error("failed to {op} {net} on {group}: {message}")]
    Mutate {
        op: RuleOp,
        net: Ipv4Net,
        group: String,
        message: String,
    },
}

/// Read and mutate the managed slice of a firewall rule group.
///
/// Implementations must make both mutations idempotent: revoking a rule that
/// is already absent and authorizing a rule that is already present are
/// no-ops, not errors. The reconciler relies on this to make a re-run after
/// any failure safe without rollback.
#[async_trait]
pub trait FirewallStore: Send + Sync {
    /// Current canonical rule set, filtered to the managed description and
    /// port. Foreign rules are never reported and never touched.
    async fn read_rules(&self) -> Result<CanonicalSet, StoreError>;

    async fn revoke_rule(&self, net: Ipv4Net) -> Result<(), StoreError>;

    async fn authorize_rule(&self, net: Ipv4Net) -> Result<(), StoreError>;
}

/// EC2 security-group ingress rules for one group, port, and description.
pub struct Ec2SecurityGroup {
    client: Client,
    group_id: String,
    port: u16,
    description: String,
}

impl Ec2SecurityGroup {
    /// Connect using the default AWS credential chain.
    pub async fn connect(region: &str, group_id: &str, port: u16, description: &str) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: Client::new(&shared),
            group_id: group_id.to_string(),
            port,
            description: description.to_string(),
        }
    }

    fn ip_permission(&self, net: Ipv4Net, with_description: bool) -> IpPermission {
        let mut range = IpRange::builder().cidr_ip(net.to_string());
        if with_description {
            range = range.description(&self.description);
        }
        IpPermission::builder()
            .ip_protocol("tcp")
            .from_port(i32::from(self.port))
            .to_port(i32::from(self.port))
            .ip_ranges(range.build())
            .build()
    }

    fn mutate_error<E: ProvideErrorMetadata>(
        &self,
        op: RuleOp,
        net: Ipv4Net,
        err: &SdkError<E>,
    ) -> StoreError {
        StoreError::Mutate {
            op,
            net,
            group: self.group_id.clone(),
            message: error_detail(err),
        }
    }
}

#[async_trait]
impl FirewallStore for Ec2SecurityGroup {
    async fn read_rules(&self) -> Result<CanonicalSet, StoreError> {
        let output = self
            .client
            .describe_security_groups()
            .group_ids(&self.group_id)
            .send()
            .await
            .map_err(|err| StoreError::Read {
                group: self.group_id.clone(),
                message: error_detail(&err),
            })?;

        let group = output
            .security_groups()
            .first()
            .ok_or_else(|| StoreError::Read {
                group: self.group_id.clone(),
                message: "security group not found".to_string(),
            })?;

        managed_rules(group.ip_permissions(), self.port, &self.description).map_err(|message| {
            StoreError::Read {
                group: self.group_id.clone(),
                message,
            }
        })
    }

    async fn revoke_rule(&self, net: Ipv4Net) -> Result<(), StoreError> {
        // Revoke matches on protocol/port/CIDR; the description is not part
        // of the match key.
        let result = self
            .client
            .revoke_security_group_ingress()
            .group_id(&self.group_id)
            .ip_permissions(self.ip_permission(net, false))
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) if err.code() == Some("InvalidPermission.NotFound") => {
                debug!("Rule {} already absent, revoke is a no-op", net);
                Ok(())
            }
            Err(err) => Err(self.mutate_error(RuleOp::Revoke, net, &err)),
        }
    }

    async fn authorize_rule(&self, net: Ipv4Net) -> Result<(), StoreError> {
        let result = self
            .client
            .authorize_security_group_ingress()
            .group_id(&self.group_id)
            .ip_permissions(self.ip_permission(net, true))
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) if err.code() == Some("InvalidPermission.Duplicate") => {
                debug!("Rule {} already present, authorize is a no-op", net);
                Ok(())
            }
            Err(err) => Err(self.mutate_error(RuleOp::Authorize, net, &err)),
        }
    }
}

/// Extract the managed canonical rule set from raw EC2 permissions.
///
/// Keeps only tcp permissions on the managed port whose range description
/// matches the managed description.
fn managed_rules(
    permissions: &[IpPermission],
    port: u16,
    description: &str,
) -> Result<CanonicalSet, String> {
    let mut rules = CanonicalSet::new();
    for permission in permissions {
        if permission.ip_protocol() != Some("tcp") {
            continue;
        }
        if permission.from_port() != Some(i32::from(port))
            || permission.to_port() != Some(i32::from(port))
        {
            continue;
        }
        for range in permission.ip_ranges() {
            if range.description() != Some(description) {
                continue;
            }
            let Some(cidr) = range.cidr_ip() else {
                continue;
            };
            let net: Ipv4Net = cidr
                .parse()
                .map_err(|_| format!("unparsable CIDR {:?} in group rules", cidr))?;
            rules.insert(net.trunc());
        }
    }
    Ok(rules)
}

fn error_detail<E: ProvideErrorMetadata>(err: &SdkError<E>) -> String {
    match (err.code(), err.message()) {
        (Some(code), Some(message)) => format!("{}: {}", code, message),
        (Some(code), None) => code.to_string(),
        (None, Some(message)) => message.to_string(),
        (None, None) => err.to_string(),
    }
}
