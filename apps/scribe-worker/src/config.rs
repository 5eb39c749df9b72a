use clap::Parser;
use scribe_queue::QueueConfig;

#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "Audio transcription worker", long_about = None)]
pub struct Config {
	#[arg(long, env = "DATABASE_URL", default_value = "sqlite:scribe.db", help = "SQLite database URL")]
	pub database_url: String,

	#[arg(long, env = "BLOB_ROOT", default_value = "./blobs", help = "Root directory of the content-addressed blob store")]
	pub blob_root: String,

	#[arg(long, env = "RUST_LOG", help = "Tracing filter, e.g. info or scribe_queue=debug")]
	pub rust_log: Option<String>,

	#[arg(long, env = "LOG_JSON", default_value = "false", help = "Emit logs as JSON lines")]
	pub log_json: bool,

	#[command(flatten)]
	pub queue: QueueConfig,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = Config::try_parse_from(vec!["scribe-worker"]).unwrap();
		assert_eq!(config.database_url, "sqlite:scribe.db");
		assert_eq!(config.blob_root, "./blobs");
		assert!(!config.log_json);
		assert_eq!(config.queue.workers, 2);
		assert!(config.queue.validate().is_ok());
	}
}
