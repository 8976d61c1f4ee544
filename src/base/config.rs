//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::base::identity::extract_localpart;

use super::types::Res;

/// Default location of the chat library's session store.
fn default_storage_path() -> PathBuf {
    PathBuf::from(".hidden/matrix-store")
}

/// Default WSDL document of the Moira web service.
fn default_moira_wsdl_url() -> String {
    "https://moiraws.mit.edu/moiraws/services/moira?wsdl".to_string()
}

/// Default realms accepted when reducing kerberos principals to usernames.
fn default_kerberos_realms() -> Vec<String> {
    vec!["ATHENA.MIT.EDU".to_string(), "MIT.EDU".to_string()]
}

/// Default list-name prefix that marks a list as a class.
fn default_class_prefix() -> String {
    "canvas".to_string()
}

/// Default list-name prefix the `!myclasses` command reports.
fn default_myclasses_prefix() -> String {
    "canvas-2023".to_string()
}

/// Configuration for the moira-bot application.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfigInner {
    /// Matrix homeserver URL (`HOMESERVER_URL`).
    pub homeserver_url: String,
    /// The bot's own fully qualified user ID (`BOT_USER_ID`).
    pub bot_user_id: String,
    /// The device ID the access token was issued for (`DEVICE_ID`).
    pub device_id: String,
    /// File holding the Matrix access token (`ACCESS_TOKEN_FILE`).
    pub access_token_file: PathBuf,
    /// Directory of the Matrix session store (`STORAGE_PATH`).
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    /// WSDL URL of the Moira SOAP service (`MOIRA_WSDL_URL`).
    #[serde(default = "default_moira_wsdl_url")]
    pub moira_wsdl_url: String,
    /// PEM private key used for the client certificate (`MOIRA_KEY_FILE`).
    pub moira_key_file: PathBuf,
    /// PEM client certificate (`MOIRA_CERT_FILE`).
    pub moira_cert_file: PathBuf,
    /// Realms accepted for kerberos list members (`KERBEROS_REALMS`, comma separated).
    #[serde(default = "default_kerberos_realms")]
    pub kerberos_realms: Vec<String>,
    /// Prefix that marks a user list as a class (`CLASS_PREFIX`).
    #[serde(default = "default_class_prefix")]
    pub class_prefix: String,
    /// Prefix the `!myclasses` command further narrows classes to (`MYCLASSES_PREFIX`).
    #[serde(default = "default_myclasses_prefix")]
    pub myclasses_prefix: String,
    /// Reply with the error text when a command fails (`REPLY_ON_ERROR`).
    #[serde(default)]
    pub reply_on_error: bool,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            homeserver_url: String::new(),
            bot_user_id: String::new(),
            device_id: String::new(),
            access_token_file: PathBuf::new(),
            storage_path: default_storage_path(),
            moira_wsdl_url: default_moira_wsdl_url(),
            moira_key_file: PathBuf::new(),
            moira_cert_file: PathBuf::new(),
            kerberos_realms: default_kerberos_realms(),
            class_prefix: default_class_prefix(),
            myclasses_prefix: default_myclasses_prefix(),
            reply_on_error: false,
        }
    }
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let env = config::Environment::default()
            .prefix("MOIRA_BOT")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("kerberos_realms");

        let mut cfg = config::Config::builder().add_source(env);

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Check the invariants `serde` cannot express.
    pub fn validate(&self) -> Res<()> {
        if extract_localpart(&self.bot_user_id).is_err() {
            return Err(anyhow::anyhow!("Bot user ID must be of the form `@name:domain`."));
        }

        if self.kerberos_realms.is_empty() {
            return Err(anyhow::anyhow!("At least one kerberos realm must be configured."));
        }

        Ok(())
    }
}
