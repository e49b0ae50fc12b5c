pub mod commands {
    pub const PUBLISH: &str = "TI101";
    pub const CLEANUP: &str = "TI201";
    pub const INDEX_SHOW: &str = "TI401";
    pub const LOCK_STATUS: &str = "TI402";
    pub const LOCK_RELEASE: &str = "TI403";
    pub const GENERIC: &str = "TI000";
}

pub mod publish {
    pub const MERGE_CONFLICT: &str = "TI110";
    pub const DECODE: &str = "TI120";
    pub const ENCODE: &str = "TI121";
}

pub mod cleanup {
    pub const INVALID_POLICY: &str = "TI210";
}

pub mod store {
    pub const NOT_FOUND: &str = "TI301";
    pub const METHOD_NOT_ALLOWED: &str = "TI302";
    pub const BACKEND: &str = "TI310";
}
