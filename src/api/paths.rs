//! All Paths are recorded here for use throughout this codebase
pub mod base {
    pub const ROOT: &str = "/";
    pub const HEALTH: &str = "/health";
    pub const ABOUT: &str = "/about";
    pub const STATUS: &str = "/status";
}

pub mod rate_limits {
    pub const LIMIT: &str = "/rl/{key}";
    pub const CHECK: &str = "/rl-check/{key}";
}

// Node-to-node routes; not part of the public API
pub mod internal {
    pub const INCREMENT: &str = "/internal/increment";
    pub const PEEK: &str = "/internal/peek";
    pub const ANNOUNCE: &str = "/internal/registry";
    pub const LOOKUP: &str = "/internal/registry/{name}";
}

pub fn limit_path(key: &str) -> String {
    rate_limits::LIMIT.replace("{key}", key)
}

pub fn check_path(key: &str) -> String {
    rate_limits::CHECK.replace("{key}", key)
}
