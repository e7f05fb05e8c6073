use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub ads_sheet_url: String,
    pub setup_sheet_url: String,
    pub meta_access_token: String,
    pub meta_api_base_url: String,
    pub anthropic_api_key: String,
    pub anthropic_base_url: String,
    pub anthropic_model: String,
    /// Shared secret expected on Fathom webhook deliveries. When unset the
    /// ingestion endpoint accepts unauthenticated posts (local development).
    pub fathom_webhook_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            ads_sheet_url: std::env::var("ADS_SHEET_URL")
                .map_err(|_| anyhow::anyhow!("ADS_SHEET_URL environment variable required"))
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("ADS_SHEET_URL cannot be empty");
                    }
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("ADS_SHEET_URL must start with http:// or https://");
                    }
                    Ok(url)
                })?,
            setup_sheet_url: std::env::var("SETUP_SHEET_URL")
                .map_err(|_| anyhow::anyhow!("SETUP_SHEET_URL environment variable required"))
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("SETUP_SHEET_URL cannot be empty");
                    }
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("SETUP_SHEET_URL must start with http:// or https://");
                    }
                    Ok(url)
                })?,
            meta_access_token: std::env::var("META_ACCESS_TOKEN")
                .map_err(|_| anyhow::anyhow!("META_ACCESS_TOKEN environment variable required"))
                .and_then(|token| {
                    if token.trim().is_empty() {
                        anyhow::bail!("META_ACCESS_TOKEN cannot be empty");
                    }
                    Ok(token)
                })?,
            meta_api_base_url: std::env::var("META_API_BASE_URL")
                .unwrap_or_else(|_| "https://graph.facebook.com/v21.0".to_string()),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY")
                .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY environment variable required"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("ANTHROPIC_API_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            anthropic_base_url: std::env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com".to_string()),
            anthropic_model: std::env::var("ANTHROPIC_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string()),
            fathom_webhook_secret: std::env::var("FATHOM_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Ads sheet URL: {}", config.ads_sheet_url);
        tracing::debug!("Setup sheet URL: {}", config.setup_sheet_url);
        tracing::debug!("Meta API base URL: {}", config.meta_api_base_url);
        tracing::debug!("Anthropic model: {}", config.anthropic_model);
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
