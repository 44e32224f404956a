pub const APP_NAME: &str = "Market Flip Scanner";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const USER_AGENT: &str = concat!("market-flip-scanner/", env!("CARGO_PKG_VERSION"));

pub fn version_label() -> String {
    format!("v{APP_VERSION}")
}
