pub mod moira;
pub mod soap;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::base::{config::Config, types::Res};

// Errors.

/// Failures of a directory call that callers may want to tell apart.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The remote call returned no payload at all (as opposed to an empty collection).
    #[error("`{operation}` returned no result")]
    NoResult { operation: String },
    /// The service answered with a SOAP fault.
    #[error("`{operation}` failed with fault `{code}`: {message}")]
    Fault { operation: String, code: String, message: String },
    /// The response could not be understood.
    #[error("Malformed response to `{operation}`: {reason}")]
    Malformed { operation: String, reason: String },
}

// Types.

/// Kind of entity a list member is.
///
/// The wire value is matched case-exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberType {
    User,
    List,
    String,
    Kerberos,
    Other(std::string::String),
}

impl MemberType {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "USER" => Self::User,
            "LIST" => Self::List,
            "STRING" => Self::String,
            "KERBEROS" => Self::Kerberos,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One member of a directory list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMember {
    pub list_name: String,
    pub member: String,
    pub member_type: MemberType,
}

/// Metadata of a directory list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListAttributes {
    pub name: String,
    pub description: String,
    pub active: bool,
    pub public: bool,
    pub hidden: bool,
    pub is_mail_list: bool,
    pub is_nfs_group: bool,
    pub is_mailman_list: bool,
    pub mailman_server: String,
    pub ace_type: String,
    pub ace_name: String,
    pub mem_ace_type: String,
    pub mem_ace_name: String,
    pub gid: Option<i64>,
    pub last_modified: Option<DateTime<Utc>>,
    pub modified_by: String,
    pub modified_with: String,
}

/// Metadata of a directory user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAttributes {
    pub user_name: String,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub status: String,
    pub mit_id: String,
    pub class_year: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub modified_by: String,
    pub modified_with: String,
}

// Traits.

/// Generic directory trait that clients must implement.
///
/// These are the raw remote queries. Derived queries (MIT members, full names,
/// classes) live on [`DirectoryClient`] so they work over any implementation.
#[async_trait]
pub trait GenericDirectoryClient: Send + Sync + 'static {
    /// Get the members of a list, expanding sublists server-side when `recursive` is set.
    async fn get_members_of_list(&self, list_name: &str, recursive: bool) -> Res<Vec<ListMember>>;

    /// Get the attributes of a list.
    async fn get_list_attributes(&self, list_name: &str) -> Res<ListAttributes>;

    /// Get the attributes of a user.
    async fn get_user_attributes(&self, kerb: &str) -> Res<UserAttributes>;

    /// Get the names of the lists a user belongs to.
    async fn get_user_lists(&self, kerb: &str) -> Res<Vec<String>>;

    /// List the operations the remote service advertises.
    ///
    /// Diagnostic only.
    async fn describe_operations(&self) -> Res<Vec<String>>;
}

// Structs.

/// Directory client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct DirectoryClient {
    inner: Arc<dyn GenericDirectoryClient>,
    config: Config,
}

impl Deref for DirectoryClient {
    type Target = dyn GenericDirectoryClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl DirectoryClient {
    pub fn new(inner: Arc<dyn GenericDirectoryClient>, config: &Config) -> Self {
        Self { inner, config: config.clone() }
    }

    /// Get the bare usernames of a list's users and in-realm kerberos principals.
    pub async fn get_mit_members_of_list(&self, list_name: &str) -> Res<Vec<String>> {
        let members = self.get_members_of_list(list_name, false).await?;

        Ok(members
            .iter()
            .filter_map(|m| match m.member_type {
                MemberType::User => Some(m.member.as_str()),
                MemberType::Kerberos => kerberos_username(&m.member, &self.config.kerberos_realms),
                _ => None,
            })
            .map(str::to_string)
            .collect())
    }

    /// Get a user's full name.
    pub async fn get_user_name(&self, kerb: &str) -> Res<String> {
        let user = self.get_user_attributes(kerb).await?;
        Ok(full_name(&user))
    }

    /// Get the user lists whose names mark them as classes.
    pub async fn get_user_classes(&self, kerb: &str) -> Res<Vec<String>> {
        let lists = self.get_user_lists(kerb).await?;
        Ok(lists.into_iter().filter(|l| l.starts_with(&self.config.class_prefix)).collect())
    }
}

// Helpers.

/// Reduce `kerb/root@REALM` or `kerb@REALM` to `kerb` when `REALM` is accepted.
pub fn kerberos_username<'a>(principal: &'a str, realms: &[String]) -> Option<&'a str> {
    let (name, realm) = principal.split_once('@')?;

    if !realms.iter().any(|r| r == realm) {
        return None;
    }

    let kerb = name.strip_suffix("/root").unwrap_or(name);

    if kerb.is_empty() || kerb.contains('/') {
        return None;
    }

    Some(kerb)
}

/// Join the non-empty parts of first, middle, and last name.
pub fn full_name(user: &UserAttributes) -> String {
    [&user.first_name, &user.middle_name, &user.last_name]
        .into_iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn realms() -> Vec<String> {
        vec!["ATHENA.MIT.EDU".to_string(), "MIT.EDU".to_string()]
    }

    #[test]
    fn test_member_type_is_case_exact() {
        assert_eq!(MemberType::from_wire("USER"), MemberType::User);
        assert_eq!(MemberType::from_wire("KERBEROS"), MemberType::Kerberos);
        assert_eq!(MemberType::from_wire("user"), MemberType::Other("user".to_string()));
    }

    #[test]
    fn test_kerberos_username() {
        assert_eq!(kerberos_username("xyz/root@ATHENA.MIT.EDU", &realms()), Some("xyz"));
        assert_eq!(kerberos_username("xyz@ATHENA.MIT.EDU", &realms()), Some("xyz"));
        assert_eq!(kerberos_username("xyz@MIT.EDU", &realms()), Some("xyz"));
    }

    #[test]
    fn test_kerberos_username_rejects() {
        assert_eq!(kerberos_username("foo@CORP.EXAMPLE", &realms()), None);
        assert_eq!(kerberos_username("foo@athena.mit.edu", &realms()), None);
        assert_eq!(kerberos_username("foo@SUB.ATHENA.MIT.EDU", &realms()), None);
        assert_eq!(kerberos_username("foo/admin@ATHENA.MIT.EDU", &realms()), None);
        assert_eq!(kerberos_username("foo", &realms()), None);
        assert_eq!(kerberos_username("@ATHENA.MIT.EDU", &realms()), None);
    }

    #[test]
    fn test_full_name() {
        let mut user = UserAttributes {
            first_name: "Jane".to_string(),
            middle_name: "Q".to_string(),
            last_name: "Doe".to_string(),
            ..Default::default()
        };
        assert_eq!(full_name(&user), "Jane Q Doe");

        user.middle_name.clear();
        assert_eq!(full_name(&user), "Jane Doe");

        user.last_name.clear();
        assert_eq!(full_name(&user), "Jane");

        user.first_name.clear();
        user.last_name = "Doe".to_string();
        assert_eq!(full_name(&user), "Doe");

        user.last_name.clear();
        assert_eq!(full_name(&user), "");
    }
}
