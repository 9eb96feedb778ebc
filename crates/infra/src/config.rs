use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub port: u16,
    pub log_level: String,
    pub data_backend: String,
    pub sqlite_path: String,
    pub jwt_secret: String,
    /// User adopted as seller for listings without an owner. Empty
    /// disables the fallback: chats on ownerless listings 404.
    pub fallback_seller_id: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("port", 3000)?
            .set_default("log_level", "info")?
            .set_default("data_backend", "memory")?
            .set_default("sqlite_path", "domus.db")?
            .set_default("jwt_secret", "dev-secret")?
            .set_default("fallback_seller_id", "")?
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn fallback_seller(&self) -> Option<String> {
        if self.fallback_seller_id.is_empty() {
            None
        } else {
            Some(self.fallback_seller_id.clone())
        }
    }
}
