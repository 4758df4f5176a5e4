//! 配置文件读写：缺省生成、与默认值合并、带注释回写。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid yaml at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMeta {
    pub name: &'static str,
    pub description: &'static str,
}

pub trait ConfigSpec: Serialize + DeserializeOwned + Default {
    const FILE_NAME: &'static str;
    fn fields() -> &'static [FieldMeta];
}

/// 配置文件实际位置：显式路径 > `base_dir/FILE_NAME` > 当前目录下的 `FILE_NAME`。
pub fn config_path<T: ConfigSpec>(explicit: Option<&Path>, base_dir: Option<&Path>) -> PathBuf {
    match (explicit, base_dir) {
        (Some(p), _) => p.to_path_buf(),
        (None, Some(base)) => base.join(T::FILE_NAME),
        (None, None) => PathBuf::from(T::FILE_NAME),
    }
}

pub fn load_or_create<T: ConfigSpec>(base_dir: Option<&Path>) -> Result<T, ConfigError> {
    load_or_create_at::<T>(&config_path::<T>(None, base_dir))
}

/// 读取配置；文件不存在时写出默认配置。
///
/// 用户文件中缺少的字段用默认值补齐，并把补齐后的完整配置（带注释）写回，
/// 这样升级后新增的选项会自动出现在 `config.yml` 里。
pub fn load_or_create_at<T: ConfigSpec>(path: &Path) -> Result<T, ConfigError> {
    ensure_parent(path)?;

    if !path.exists() {
        let fresh = T::default();
        write_with_comments(&fresh, path)?;
        return Ok(fresh);
    }

    let user_yaml = read_yaml(path)?;
    let missing = has_missing_fields::<T>(&user_yaml);

    let mut merged = serde_yaml::to_value(T::default())
        .map_err(|err| ConfigError::Validation(err.to_string()))?;
    merge_values(&mut merged, user_yaml);

    let config: T =
        serde_yaml::from_value(merged).map_err(|err| ConfigError::Validation(err.to_string()))?;

    if missing {
        write_with_comments(&config, path)?;
    }

    Ok(config)
}

pub fn write_with_comments<T: ConfigSpec>(config: &T, path: &Path) -> Result<(), ConfigError> {
    ensure_parent(path)?;
    let yaml = generate_yaml_with_comments(config)?;
    fs::write(path, yaml).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn generate_yaml_with_comments<T: ConfigSpec>(config: &T) -> Result<String, ConfigError> {
    let Value::Mapping(mapping) =
        serde_yaml::to_value(config).map_err(|err| ConfigError::Validation(err.to_string()))?
    else {
        return Err(ConfigError::Validation(
            "config must serialize to a mapping".to_string(),
        ));
    };

    let mut blocks = Vec::with_capacity(T::fields().len());
    for field in T::fields() {
        let mut block = String::new();
        for line in field.description.lines().filter(|l| !l.is_empty()) {
            block.push_str("# ");
            block.push_str(line);
            block.push('\n');
        }
        let key = Value::String(field.name.to_string());
        let val = mapping.get(&key).cloned().unwrap_or(Value::Null);
        let yaml_line = serde_yaml::to_string(&Mapping::from_iter([(key, val)]))
            .map_err(|err| ConfigError::Validation(err.to_string()))?;
        block.push_str(yaml_line.trim_end());
        blocks.push(block);
    }

    let mut out = blocks.join("\n");
    out.push('\n');
    Ok(out)
}

fn read_yaml(path: &Path) -> Result<Value, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Ok(Value::Mapping(Mapping::new()));
    }
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn has_missing_fields<T: ConfigSpec>(user_yaml: &Value) -> bool {
    let Value::Mapping(map) = user_yaml else {
        return true;
    };
    T::fields()
        .iter()
        .any(|field| !map.contains_key(Value::String(field.name.to_string())))
}

fn merge_values(default: &mut Value, user: Value) {
    match (default, user) {
        (Value::Mapping(dest), Value::Mapping(src)) => {
            for (key, user_val) in src {
                match dest.get_mut(&key) {
                    Some(dest_val) => merge_values(dest_val, user_val),
                    None => {
                        dest.insert(key, user_val);
                    }
                }
            }
        }
        // `key:` 留空时保留默认值
        (_, Value::Null) => {}
        (dest, other) => *dest = other,
    }
}

fn ensure_parent(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        workers: usize,
        tags: Vec<String>,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                name: "default".to_string(),
                workers: 2,
                tags: vec!["a".to_string()],
            }
        }
    }

    impl ConfigSpec for Sample {
        const FILE_NAME: &'static str = "sample.yml";

        fn fields() -> &'static [FieldMeta] {
            static FIELDS: [FieldMeta; 3] = [
                FieldMeta {
                    name: "name",
                    description: "名称",
                },
                FieldMeta {
                    name: "workers",
                    description: "并发数\n至少为 1",
                },
                FieldMeta {
                    name: "tags",
                    description: "",
                },
            ];
            &FIELDS
        }
    }

    #[test]
    fn creates_default_file_with_comments() {
        let dir = TempDir::new().unwrap();
        let cfg: Sample = load_or_create(Some(dir.path())).unwrap();
        assert_eq!(cfg, Sample::default());

        let text = fs::read_to_string(dir.path().join("sample.yml")).unwrap();
        assert!(text.contains("# 名称\nname: default"));
        assert!(text.contains("# 并发数\n# 至少为 1\nworkers: 2"));
    }

    #[test]
    fn merges_partial_user_file_and_fills_missing_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.yml");
        fs::write(&path, "workers: 7\nname:\n").unwrap();

        let cfg: Sample = load_or_create_at(&path).unwrap();
        assert_eq!(cfg.workers, 7);
        assert_eq!(cfg.name, "default");
        assert_eq!(cfg.tags, vec!["a".to_string()]);

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("tags:"));
        assert!(rewritten.contains("workers: 7"));
    }

    #[test]
    fn invalid_yaml_is_reported_with_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.yml");
        fs::write(&path, "workers: [1, 2\n").unwrap();

        match load_or_create_at::<Sample>(&path) {
            Err(ConfigError::Parse { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn config_path_resolution_order() {
        let explicit = Path::new("/tmp/x.yml");
        let base = Path::new("/data");
        assert_eq!(
            config_path::<Sample>(Some(explicit), Some(base)),
            PathBuf::from("/tmp/x.yml")
        );
        assert_eq!(
            config_path::<Sample>(None, Some(base)),
            PathBuf::from("/data/sample.yml")
        );
        assert_eq!(
            config_path::<Sample>(None, None),
            PathBuf::from("sample.yml")
        );
    }
}
