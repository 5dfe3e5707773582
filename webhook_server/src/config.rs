use std::env;

use log::*;
use pwg_common::Secret;

const DEFAULT_PWG_HOST: &str = "127.0.0.1";
const DEFAULT_PWG_PORT: u16 = 8260;
/// The header the payment provider uses to sign webhook deliveries.
pub const PSP_HMAC_HEADER: &str = "X-Psp-Hmac-Sha256";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address,
    /// rather than the connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather
    /// than the connection's remote address.
    pub use_forwarded: bool,
    /// The merchant account the provider reports events for. Informational; deliveries are
    /// authenticated by signature and credentials, not by this value.
    pub merchant_account: String,
    /// Key used to verify the HMAC signature on webhook deliveries.
    pub hmac_secret: Secret<String>,
    /// When false, signature checks are skipped. Only ever disable this in development.
    pub hmac_checks: bool,
    /// Basic-auth credentials the provider sends with each webhook delivery.
    pub webhook_username: String,
    pub webhook_password: Secret<String>,
    /// Basic-auth credentials for the administrative endpoints.
    pub admin_username: String,
    pub admin_password: Secret<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PWG_HOST.to_string(),
            port: DEFAULT_PWG_PORT,
            database_url: String::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            merchant_account: String::default(),
            hmac_secret: Secret::default(),
            hmac_checks: true,
            webhook_username: String::default(),
            webhook_password: Secret::default(),
            admin_username: String::default(),
            admin_password: Secret::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("PWG_HOST").ok().unwrap_or_else(|| DEFAULT_PWG_HOST.into());
        let port = env::var("PWG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for PWG_PORT. {e} Using the default, \
                         {DEFAULT_PWG_PORT}, instead."
                    );
                    DEFAULT_PWG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_PWG_PORT);
        let database_url = env::var("PWG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ PWG_DATABASE_URL is not set. Please set it to the URL for the gateway database.");
            String::default()
        });
        let merchant_account = env::var("PWG_MERCHANT_ACCOUNT").ok().unwrap_or_else(|| {
            warn!("🪛️ PWG_MERCHANT_ACCOUNT is not set. Webhook deliveries will not be labelled.");
            String::default()
        });
        let hmac_secret = env::var("PWG_HMAC_SECRET").ok().unwrap_or_else(|| {
            error!(
                "🪛️ PWG_HMAC_SECRET is not set. Please set it to the HMAC signing key configured \
                 with the payment provider."
            );
            String::default()
        });
        let hmac_checks = env::var("PWG_HMAC_CHECKS").map(|s| &s != "0" && &s != "false").unwrap_or(true);
        if !hmac_checks {
            warn!(
                "🚨️ Webhook HMAC checks are disabled. Anyone can submit notifications. Do not \
                 run like this in production."
            );
        }
        let (webhook_username, webhook_password) =
            credentials_from_env("PWG_WEBHOOK_USERNAME", "PWG_WEBHOOK_PASSWORD");
        let (admin_username, admin_password) =
            credentials_from_env("PWG_ADMIN_USERNAME", "PWG_ADMIN_PASSWORD");
        let use_x_forwarded_for =
            env::var("PWG_USE_X_FORWARDED_FOR").map(|s| &s == "1" || &s == "true").unwrap_or(false);
        let use_forwarded = env::var("PWG_USE_FORWARDED").map(|s| &s == "1" || &s == "true").unwrap_or(false);
        Self {
            host,
            port,
            database_url,
            use_x_forwarded_for,
            use_forwarded,
            merchant_account,
            hmac_secret: Secret::new(hmac_secret),
            hmac_checks,
            webhook_username,
            webhook_password,
            admin_username,
            admin_password,
        }
    }
}

fn credentials_from_env(user_var: &str, password_var: &str) -> (String, Secret<String>) {
    let username = env::var(user_var).ok().unwrap_or_else(|| {
        error!("🪛️ {user_var} is not set. The matching endpoints will reject every request.");
        String::default()
    });
    let password = env::var(password_var).ok().unwrap_or_else(|| {
        error!("🪛️ {password_var} is not set. The matching endpoints will reject every request.");
        String::default()
    });
    (username, Secret::new(password))
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// A subset of the server configuration that handlers need at request time. Kept small, and
/// free of secrets, so it can be cloned into application data without passing sensitive
/// information around the system.
#[derive(Clone, Debug)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
    pub merchant_account: String,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            use_x_forwarded_for: config.use_x_forwarded_for,
            use_forwarded: config.use_forwarded,
            merchant_account: config.merchant_account.clone(),
        }
    }
}
