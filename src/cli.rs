//! 命令行参数

use clap::Parser;
use std::path::PathBuf;

/// 从 JSON 文件回放一批云端记录，合并进本地索引
#[derive(Parser, Debug)]
#[command(name = "gallerysync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// 云端记录文件（JSON 数组）
    pub records: PathBuf,

    /// 沙箱目录，默认为数据目录下的 sandbox
    pub sandbox_dir: Option<PathBuf>,

    /// 数据目录（配置、日志、索引数据库）
    #[arg(long, env = "GALLERYSYNC_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

impl Cli {
    pub fn sandbox_dir(&self, data_dir: &std::path::Path) -> PathBuf {
        self.sandbox_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("sandbox"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_records_only() {
        let cli = Cli::parse_from(["gallerysync", "records.json"]);
        assert_eq!(cli.records, PathBuf::from("records.json"));
        assert!(cli.sandbox_dir.is_none());
        assert_eq!(
            cli.sandbox_dir(std::path::Path::new("/data")),
            PathBuf::from("/data/sandbox")
        );
    }

    #[test]
    fn parse_sandbox_and_data_dir() {
        let cli = Cli::parse_from([
            "gallerysync",
            "records.json",
            "/tmp/sandbox",
            "--data-dir",
            "/tmp/data",
        ]);
        assert_eq!(cli.sandbox_dir, Some(PathBuf::from("/tmp/sandbox")));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/data")));
    }

    #[test]
    fn records_are_required() {
        assert!(Cli::try_parse_from(["gallerysync"]).is_err());
    }
}
