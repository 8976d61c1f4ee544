//! Moira directory service integration for moira-bot.
//!
//! The service is a WSDL-described SOAP endpoint reached over HTTPS with a
//! client certificate. The WSDL is fetched once at startup to learn the
//! namespace and endpoint; every query afterwards is a single POST.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, header::CONTENT_TYPE};
use tracing::{debug, info, instrument};

use crate::base::{config::Config, types::Res};

use super::{
    DirectoryClient, DirectoryError, GenericDirectoryClient, ListAttributes, ListMember, MemberType, UserAttributes,
    soap::{self, SoapResponse, WsdlInfo, XmlNode},
};

/// A `maxReturnCount` of zero asks for every member.
const UNLIMITED: u32 = 0;

// Extra methods on `DirectoryClient` applied by the moira implementation.

impl DirectoryClient {
    /// Creates a new Moira directory client.
    pub async fn moira(config: &Config) -> Res<Self> {
        let client = MoiraDirectoryClient::new(config).await?;
        Ok(Self::new(Arc::new(client), config))
    }
}

// Structs.

/// Moira client implementation.
pub struct MoiraDirectoryClient {
    http: reqwest::Client,
    wsdl: WsdlInfo,
}

impl MoiraDirectoryClient {
    /// Authenticate with the client certificate and load the service description.
    #[instrument(name = "MoiraDirectoryClient::new", skip_all)]
    pub async fn new(config: &Config) -> Res<Self> {
        // Load the client identity.

        let mut pem = std::fs::read(&config.moira_cert_file).with_context(|| format!("Failed to read certificate file `{}`", config.moira_cert_file.display()))?;
        let key = std::fs::read(&config.moira_key_file).with_context(|| format!("Failed to read private key file `{}`", config.moira_key_file.display()))?;
        pem.push(b'\n');
        pem.extend_from_slice(&key);

        let identity = reqwest::Identity::from_pem(&pem).context("Failed to load client certificate")?;
        let http = reqwest::Client::builder().use_rustls_tls().identity(identity).build()?;

        // Fetch the service description.

        let document = http.get(&config.moira_wsdl_url).send().await?.error_for_status()?.text().await?;
        let wsdl = soap::parse_wsdl(&document)?;

        info!("Moira endpoint: {} ({} operations)", wsdl.endpoint, wsdl.operations.len());

        Ok(Self { http, wsdl })
    }

    /// Invoke a SOAP operation and unwrap its response envelope.
    #[instrument(skip(self, params))]
    async fn call(&self, operation: &str, params: &[(&str, String)]) -> Res<SoapResponse> {
        let envelope = soap::build_envelope(&self.wsdl.target_namespace, operation, params)?;

        let response = self
            .http
            .post(&self.wsdl.endpoint)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", "\"\"")
            .body(envelope)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        debug!("`{}` answered with status {}", operation, status);

        interpret_response(status, &body, operation)
    }
}

#[async_trait]
impl GenericDirectoryClient for MoiraDirectoryClient {
    async fn get_members_of_list(&self, list_name: &str, recursive: bool) -> Res<Vec<ListMember>> {
        let operation = "getListMembership";
        let params = [("listName", list_name.to_string()), ("recursive", recursive.to_string()), ("maxReturnCount", UNLIMITED.to_string())];

        let items = self.call(operation, &params).await?.into_items()?;

        Ok(items.iter().map(|i| list_member(i, operation)).collect::<Result<Vec<_>, DirectoryError>>()?)
    }

    async fn get_list_attributes(&self, list_name: &str) -> Res<ListAttributes> {
        let record = self.call("getListAttributes", &[("listName", list_name.to_string())]).await?.into_record()?;
        Ok(list_attributes(&record))
    }

    async fn get_user_attributes(&self, kerb: &str) -> Res<UserAttributes> {
        let record = self.call("getUserAttributes", &[("userName", kerb.to_string())]).await?.into_record()?;
        Ok(user_attributes(&record))
    }

    async fn get_user_lists(&self, kerb: &str) -> Res<Vec<String>> {
        let items = self.call("getUserLists", &[("userName", kerb.to_string())]).await?.into_items()?;
        Ok(items.into_iter().filter(|i| !i.is_nil()).map(|i| i.text).collect())
    }

    async fn describe_operations(&self) -> Res<Vec<String>> {
        Ok(self.wsdl.operations.clone())
    }
}

// Helpers.

/// Decode a call's body, falling back to the HTTP status when the body is unreadable.
///
/// Faults arrive with a 500, so a readable fault wins over the status.
fn interpret_response(status: StatusCode, body: &str, operation: &str) -> Res<SoapResponse> {
    match soap::parse_response(body, operation) {
        Err(DirectoryError::Malformed { .. }) if !status.is_success() => Err(anyhow::anyhow!("`{operation}` failed with HTTP status {status}.")),
        result => Ok(result?),
    }
}

fn text(node: &XmlNode, name: &str) -> String {
    node.child_text(name).unwrap_or_default().to_string()
}

fn flag(node: &XmlNode, name: &str) -> bool {
    matches!(node.child_text(name), Some("true") | Some("1"))
}

fn timestamp(node: &XmlNode, name: &str) -> Option<DateTime<Utc>> {
    node.child_text(name).and_then(|t| DateTime::parse_from_rfc3339(t).ok()).map(|t| t.with_timezone(&Utc))
}

fn list_member(node: &XmlNode, operation: &str) -> Result<ListMember, DirectoryError> {
    let required = |name: &str| {
        node.child_text(name).map(str::to_string).ok_or_else(|| DirectoryError::Malformed {
            operation: operation.to_string(),
            reason: format!("list member without `{name}`"),
        })
    };

    Ok(ListMember {
        list_name: text(node, "listName"),
        member: required("member")?,
        member_type: MemberType::from_wire(&required("type")?),
    })
}

fn list_attributes(node: &XmlNode) -> ListAttributes {
    ListAttributes {
        name: text(node, "listName"),
        description: text(node, "description"),
        active: flag(node, "active"),
        public: flag(node, "publicFlag"),
        hidden: flag(node, "hidden"),
        is_mail_list: flag(node, "isMailList"),
        is_nfs_group: flag(node, "isNFSGroup"),
        is_mailman_list: flag(node, "isMailmanList"),
        mailman_server: text(node, "mailmanServer"),
        ace_type: text(node, "aceType"),
        ace_name: text(node, "aceName"),
        mem_ace_type: text(node, "memaceType"),
        mem_ace_name: text(node, "memaceName"),
        gid: node.child_text("gid").and_then(|g| g.trim().parse().ok()),
        last_modified: timestamp(node, "lastModifiedDate"),
        modified_by: text(node, "lastModifiedBy"),
        modified_with: text(node, "lastModifiedWith"),
    }
}

fn user_attributes(node: &XmlNode) -> UserAttributes {
    UserAttributes {
        user_name: text(node, "userName"),
        first_name: text(node, "firstName"),
        middle_name: text(node, "middleName"),
        last_name: text(node, "lastName"),
        status: text(node, "status"),
        mit_id: text(node, "mitId"),
        class_year: text(node, "userClass"),
        last_modified: timestamp(node, "lastModifiedDate"),
        modified_by: text(node, "lastModifiedBy"),
        modified_with: text(node, "lastModifiedWith"),
    }
}
