//! 记录分类 - 从云端记录推导媒体类型和扩展名

use crate::core::record::{CloudRecord, FILE_NAME, FILE_TYPE};
use crate::db::MediaKind;
use crate::error::{MergeError, Result};

pub const FILE_TYPE_IMAGE: &str = "image";
pub const FILE_TYPE_VIDEO: &str = "video";

/// 读取顶层 fileType 字段得到媒体类型
pub fn classify_media_kind(record: &CloudRecord) -> Result<MediaKind> {
    let file_type = record.get_string(FILE_TYPE)?;
    match file_type {
        FILE_TYPE_IMAGE => Ok(MediaKind::Image),
        FILE_TYPE_VIDEO => Ok(MediaKind::Video),
        other => Err(MergeError::invalid(format!(
            "record {} has unknown file type {:?}",
            record.record_id, other
        ))),
    }
}

/// 读取 fileName 的扩展名，任何异常都退化为空字符串
pub fn extract_file_extension(record: &CloudRecord) -> String {
    record
        .get_string(FILE_NAME)
        .ok()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
        .map(str::to_string)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn with_type(value: impl Into<crate::core::record::FieldValue>) -> CloudRecord {
        CloudRecord::new("r").with_field(FILE_TYPE, value)
    }

    #[test]
    fn test_classify_known_kinds() {
        assert_eq!(classify_media_kind(&with_type("image")).unwrap(), MediaKind::Image);
        assert_eq!(classify_media_kind(&with_type("video")).unwrap(), MediaKind::Video);
    }

    #[test]
    fn test_classify_rejects_missing_unknown_and_mistyped() {
        let missing = CloudRecord::new("r");
        assert_eq!(
            classify_media_kind(&missing).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            classify_media_kind(&with_type("abc")).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            classify_media_kind(&with_type(1i64)).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_extension_found() {
        for (name, ext) in [
            ("photo.heic", "heic"),
            ("a.b.jpg", "jpg"),
            (".hidden", "hidden"),
            ("clip.MP4", "MP4"),
        ] {
            let record = CloudRecord::new("r").with_field(FILE_NAME, name);
            assert_eq!(extract_file_extension(&record), ext, "{}", name);
        }
    }

    #[test]
    fn test_extension_degrades_to_empty() {
        let cases = [
            CloudRecord::new("r"),
            CloudRecord::new("r").with_field(FILE_NAME, 12i64),
            CloudRecord::new("r").with_field(FILE_NAME, ""),
            CloudRecord::new("r").with_field(FILE_NAME, "noext"),
            CloudRecord::new("r").with_field(FILE_NAME, "trailing."),
        ];
        for record in &cases {
            assert_eq!(extract_file_extension(record), "");
        }
    }
}
