use clap::Parser;
use std::path::PathBuf;

const DEFAULT_MAX_FILE_SIZE: usize = 52_428_800;
const DEFAULT_MRZ_ENDPOINT: &str = "https://api.ocr.space/parse/image";
const DEFAULT_CJK_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";
const DEFAULT_CJK_KEY_LIMIT: u32 = 980;

#[derive(Parser, Debug)]
#[command(name = "passport-ocr-server")]
#[command(about = "Passport OCR server producing customer records from passport photos")]
#[command(version)]
pub struct Args {
    /// Host address to bind to
    #[arg(long, env = "OCR_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "OCR_PORT", default_value = "9292")]
    pub port: u16,

    /// Maximum file size in bytes (default: 50MB)
    #[arg(long, env = "OCR_MAX_FILE_SIZE", default_value_t = DEFAULT_MAX_FILE_SIZE)]
    pub max_file_size: usize,

    /// OCR.space API key used for the machine-readable zone
    #[arg(long, env = "OCR_SPACE_API_KEY", hide_env_values = true)]
    pub mrz_api_key: Option<String>,

    /// OCR.space endpoint
    #[arg(long, env = "OCR_SPACE_ENDPOINT", default_value = DEFAULT_MRZ_ENDPOINT)]
    pub mrz_endpoint: String,

    /// Google Vision API keys, comma separated, in order of preference
    #[arg(
        long,
        env = "GOOGLE_VISION_API_KEYS",
        value_delimiter = ',',
        hide_env_values = true
    )]
    pub cjk_api_keys: Vec<String>,

    /// Google Vision endpoint
    #[arg(long, env = "GOOGLE_VISION_ENDPOINT", default_value = DEFAULT_CJK_ENDPOINT)]
    pub cjk_endpoint: String,

    /// Monthly call limit per Google Vision key
    #[arg(long, env = "GOOGLE_VISION_MONTHLY_LIMIT", default_value_t = DEFAULT_CJK_KEY_LIMIT)]
    pub cjk_key_limit: u32,

    /// JSON file holding per-key monthly usage
    #[arg(long, env = "OCR_USAGE_STORE", default_value = "api_usage.json")]
    pub usage_store: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_file_size: usize,
    pub mrz_api_key: Option<String>,
    pub mrz_endpoint: String,
    pub cjk_api_keys: Vec<String>,
    pub cjk_endpoint: String,
    pub cjk_key_limit: u32,
    pub usage_store_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9292,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            mrz_api_key: None,
            mrz_endpoint: DEFAULT_MRZ_ENDPOINT.to_string(),
            cjk_api_keys: Vec::new(),
            cjk_endpoint: DEFAULT_CJK_ENDPOINT.to_string(),
            cjk_key_limit: DEFAULT_CJK_KEY_LIMIT,
            usage_store_path: PathBuf::from("api_usage.json"),
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            max_file_size: args.max_file_size,
            mrz_api_key: args.mrz_api_key.filter(|key| !key.trim().is_empty()),
            mrz_endpoint: args.mrz_endpoint,
            cjk_api_keys: args
                .cjk_api_keys
                .into_iter()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty())
                .collect(),
            cjk_endpoint: args.cjk_endpoint,
            cjk_key_limit: args.cjk_key_limit,
            usage_store_path: args.usage_store,
        }
    }
}
