use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub tasks: TaskConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub scripts: ScriptsConfig,

    #[serde(default)]
    pub image_store: ImageStoreConfig,

    #[serde(default)]
    pub remote_store: RemoteStoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "imgtask_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task types this deployment accepts for execution.
    #[serde(default = "default_valid_tasks_type")]
    pub valid_tasks_type: Vec<String>,

    /// Hours after creation at which a task expires. 0 disables expiry.
    #[serde(default = "default_task_time_to_live_hours")]
    pub task_time_to_live_hours: u64,

    /// Wall-clock budget for one script run. 0 disables the limit.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    /// Disk formats an import may declare in `import_from_format`.
    #[serde(default = "default_allowed_import_formats")]
    pub allowed_import_formats: Vec<String>,
}

fn default_valid_tasks_type() -> Vec<String> {
    vec!["import".into(), "export".into(), "clone".into()]
}

/// Largest accepted `task_time_to_live_hours` (a thousand years).
pub const MAX_TASK_TIME_TO_LIVE_HOURS: u64 = 1000 * 365 * 24;

fn default_task_time_to_live_hours() -> u64 {
    48
}

fn default_task_timeout_secs() -> u64 {
    24 * 60 * 60
}

fn default_allowed_import_formats() -> Vec<String> {
    [
        "ami", "ari", "aki", "vhd", "vhdx", "vmdk", "raw", "qcow2", "vdi", "iso",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            valid_tasks_type: default_valid_tasks_type(),
            task_time_to_live_hours: default_task_time_to_live_hours(),
            task_timeout_secs: default_task_timeout_secs(),
            allowed_import_formats: default_allowed_import_formats(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Number of scripts allowed to run at the same time.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    1000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
        }
    }
}

/// Where an import task takes its bytes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportSource {
    /// `file:///` paths on the local filesystem.
    #[default]
    Filesystem,
    /// `<container>/<object>` in the remote store.
    ObjectStore,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptsConfig {
    #[serde(default)]
    pub import: ImportSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageStoreConfig {
    #[serde(flatten)]
    pub backend: ImageStoreBackend,

    /// Container image objects are written to.
    #[serde(default = "default_image_container")]
    pub container: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend")]
pub enum ImageStoreBackend {
    #[serde(rename = "filesystem")]
    Filesystem(FilesystemStoreConfig),
    #[serde(rename = "memory")]
    Memory(SegmentConfig),
}

fn default_image_container() -> String {
    "images".to_string()
}

impl Default for ImageStoreConfig {
    fn default() -> Self {
        Self {
            backend: ImageStoreBackend::Filesystem(FilesystemStoreConfig::default()),
            container: default_image_container(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteStoreConfig {
    #[serde(flatten)]
    pub backend: RemoteStoreBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend")]
pub enum RemoteStoreBackend {
    #[serde(rename = "swift")]
    Swift(SwiftConfig),
    #[serde(rename = "filesystem")]
    Filesystem(FilesystemStoreConfig),
    #[serde(rename = "memory")]
    Memory(SegmentConfig),
}

impl Default for RemoteStoreConfig {
    fn default() -> Self {
        Self {
            backend: RemoteStoreBackend::Filesystem(FilesystemStoreConfig::default()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesystemStoreConfig {
    /// Root directory; each container is a sub-directory. Empty means the
    /// default under the data directory.
    #[serde(default)]
    pub data_dir: String,
}

/// Object size thresholds for stores that split large objects into segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// Objects at least this large (or of unknown size) are segmented.
    #[serde(default = "default_large_object_size_mb")]
    pub large_object_size_mb: u64,

    #[serde(default = "default_large_object_chunk_size_mb")]
    pub large_object_chunk_size_mb: u64,
}

fn default_large_object_size_mb() -> u64 {
    5 * 1024
}

fn default_large_object_chunk_size_mb() -> u64 {
    200
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            large_object_size_mb: default_large_object_size_mb(),
            large_object_chunk_size_mb: default_large_object_chunk_size_mb(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwiftConfig {
    /// Keystone endpoint used to resolve the object-store URL for a token.
    #[serde(default)]
    pub auth_address: String,

    /// Skip endpoint discovery and talk to this storage URL directly.
    #[serde(default)]
    pub preauth_url: Option<String>,

    #[serde(default)]
    pub region: Option<String>,

    #[serde(default = "default_service_type")]
    pub service_type: String,

    #[serde(default)]
    pub service_name: Option<String>,

    #[serde(default = "default_endpoint_type")]
    pub endpoint_type: String,

    #[serde(default)]
    pub admin_user: String,

    #[serde(default)]
    pub admin_password: String,

    #[serde(default)]
    pub admin_tenant_name: String,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_swift_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Longest wait for the next bytes of a response. Transfers as a whole
    /// are not time limited here.
    #[serde(default = "default_swift_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_auth_retries")]
    pub auth_retries: u32,

    #[serde(default)]
    pub segments: SegmentConfig,
}

fn default_service_type() -> String {
    "object-store".to_string()
}

fn default_endpoint_type() -> String {
    "publicURL".to_string()
}

fn default_swift_connect_timeout_ms() -> u64 {
    10_000
}

fn default_swift_timeout_ms() -> u64 {
    60_000
}

fn default_auth_retries() -> u32 {
    5
}

impl Default for SwiftConfig {
    fn default() -> Self {
        Self {
            auth_address: String::new(),
            preauth_url: None,
            region: None,
            service_type: default_service_type(),
            service_name: None,
            endpoint_type: default_endpoint_type(),
            admin_user: String::new(),
            admin_password: String::new(),
            admin_tenant_name: String::new(),
            insecure: false,
            connect_timeout_ms: default_swift_connect_timeout_ms(),
            timeout_ms: default_swift_timeout_ms(),
            auth_retries: default_auth_retries(),
            segments: SegmentConfig::default(),
        }
    }
}
