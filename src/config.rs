use envconfig::Envconfig;
use std::net::SocketAddr;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "DATABASE_URL")]
    pub db_url: String,
    #[envconfig(from = "BIND_ADDRESS", default = "0.0.0.0:8080")]
    pub address: SocketAddr,
    #[envconfig(from = "CORS_ORIGIN", default = "http://localhost:3000")]
    pub cors_origin: String,
    #[envconfig(nested = true)]
    pub mail: MailConfig,
}

#[derive(Envconfig, Clone, Debug)]
pub struct MailConfig {
    #[envconfig(from = "SMTP_HOST")]
    pub smtp_host: String,
    #[envconfig(from = "SMTP_PORT", default = "587")]
    pub smtp_port: u16,
    #[envconfig(from = "SMTP_USERNAME")]
    pub smtp_username: String,
    #[envconfig(from = "SMTP_PASSWORD")]
    pub smtp_password: String,
    #[envconfig(from = "MAIL_FROM_ADDRESS")]
    pub from_address: String,
    #[envconfig(from = "MAIL_FROM_DISPLAY", default = "Student Club Portal")]
    pub from_display: String,
    // links in outgoing mail point here
    #[envconfig(from = "FRONTEND_HOST", default = "http://localhost:3000")]
    pub frontend_host: String,
}
