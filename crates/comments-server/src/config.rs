use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub captcha_code: String,
    pub max_attachment_bytes: usize,
    pub image_max_width: u32,
    pub image_max_height: u32,
    pub thread_max_depth: usize,
    pub thread_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://comments.db?mode=rwc".to_string(),
            port: 3000,
            upload_dir: PathBuf::from("./uploads"),
            captcha_code: "testCaptcha123".to_string(),
            max_attachment_bytes: 100 * 1024,
            image_max_width: 320,
            image_max_height: 240,
            thread_max_depth: 256,
            thread_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            port: parse_var("PORT", defaults.port)?,
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            captcha_code: env::var("CAPTCHA_CODE").unwrap_or(defaults.captcha_code),
            max_attachment_bytes: parse_var("MAX_ATTACHMENT_BYTES", defaults.max_attachment_bytes)?,
            image_max_width: parse_var("IMAGE_MAX_WIDTH", defaults.image_max_width)?,
            image_max_height: parse_var("IMAGE_MAX_HEIGHT", defaults.image_max_height)?,
            thread_max_depth: parse_var("THREAD_MAX_DEPTH", defaults.thread_max_depth)?,
            thread_timeout: Duration::from_secs(parse_var(
                "THREAD_TIMEOUT_SECS",
                defaults.thread_timeout.as_secs(),
            )?),
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{name} has an invalid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}
