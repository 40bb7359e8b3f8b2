use anyhow::Context;

#[derive(Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database_url: String,
    pub drive: DriveConfig,
    pub razorpay: Option<RazorpayConfig>,
    pub api_key: Option<String>,
    pub machine_id: String,
    pub frontend_url: Option<String>,
    pub log_file: String,
}

#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone)]
pub struct DriveConfig {
    pub server: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
}

#[derive(Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub base_url: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let drive = DriveConfig {
            server: {
                let server = std::env::var("DRIVE_SERVER")
                    .unwrap_or_else(|_| "http://localhost:9000".to_string());
                if !server.starts_with("http://") && !server.starts_with("https://") {
                    format!("http://{}", server)
                } else {
                    server
                }
            },
            access_key: std::env::var("DRIVE_ACCESSKEY")
                .unwrap_or_else(|_| "minioadmin".to_string()),
            secret_key: std::env::var("DRIVE_SECRET")
                .unwrap_or_else(|_| "minioadmin".to_string()),
            bucket: std::env::var("STORAGE_BUCKET")
                .unwrap_or_else(|_| "product-images".to_string()),
        };

        let razorpay = match (
            std::env::var("RAZORPAY_KEY_ID"),
            std::env::var("RAZORPAY_KEY_SECRET"),
        ) {
            (Ok(key_id), Ok(key_secret)) if !key_id.is_empty() && !key_secret.is_empty() => {
                Some(RazorpayConfig {
                    key_id,
                    key_secret,
                    base_url: std::env::var("RAZORPAY_API_BASE_URL")
                        .unwrap_or_else(|_| "https://api.razorpay.com/v1".to_string()),
                })
            }
            _ => None,
        };

        Ok(AppConfig {
            server: ServerConfig {
                host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(3005),
            },
            database_url,
            drive,
            razorpay,
            api_key: std::env::var("API_KEY").ok().filter(|k| !k.is_empty()),
            machine_id: std::env::var("MACHINE_ID").unwrap_or_else(|_| "VM-001".to_string()),
            frontend_url: std::env::var("FRONTEND_URL").ok().filter(|u| !u.is_empty()),
            log_file: std::env::var("LOG_FILE").unwrap_or_else(|_| "backend.log".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_database_url_is_an_error() {
        std::env::remove_var("DATABASE_URL");
        assert!(AppConfig::from_env().is_err());
    }
}
