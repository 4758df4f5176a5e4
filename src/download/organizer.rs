//! 下载结果整理：`closet/<卖家>/<标题>_001.webp`。
//!
//! 目标文件已存在时追加 `_dupN` 后缀，绝不覆盖。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::base_system::context::{Config, normalize_name};

const ITEM_JSON: &str = "item.json";
const PHOTO_EXTS: [&str; 4] = ["webp", "jpg", "jpeg", "png"];

#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("下载目录中没有 item.json: {0}")]
    MissingMetadata(PathBuf),
    #[error("item.json 无法解析 ({path}): {source}")]
    BadMetadata {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("item.json 中缺少 {0}")]
    MissingField(&'static str),
    #[error("没有找到可整理的图片: {0}")]
    NoPhotos(PathBuf),
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> OrganizeError + '_ {
    move |source| OrganizeError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemMetadata {
    pub item_id: Option<String>,
    pub seller: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct OrganizeReport {
    pub metadata: ItemMetadata,
    pub seller_dir: PathBuf,
    pub files: Vec<PathBuf>,
    pub metadata_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FileOrganizer {
    closet_root: PathBuf,
    keep_item_json: bool,
}

impl FileOrganizer {
    pub fn new(closet_root: impl Into<PathBuf>, keep_item_json: bool) -> Self {
        Self {
            closet_root: closet_root.into(),
            keep_item_json,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.closet_root(), cfg.keep_item_json)
    }

    pub fn closet_root(&self) -> &Path {
        &self.closet_root
    }

    /// 记录里保存的 closet 名称（根目录的最后一段）。
    pub fn closet_name(&self) -> String {
        self.closet_root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "closet".to_string())
    }

    pub fn seller_dir(&self, seller: &str) -> PathBuf {
        self.closet_root.join(normalize_name(seller))
    }

    /// 不考虑重名时的目标路径，`seq` 从 1 开始。
    pub fn destination_for(&self, seller: &str, title: &str, seq: usize, ext: &str) -> PathBuf {
        self.seller_dir(seller)
            .join(format!("{}_{seq:03}.{ext}", normalize_name(title)))
    }

    /// 把一次下载的暂存目录整理进 closet。
    ///
    /// 中途移动失败时，已放进卖家目录的文件会被移回暂存目录，
    /// closet 里不会留下没有记录的半个商品。
    pub fn organize(&self, staging: &Path) -> Result<OrganizeReport, OrganizeError> {
        self.organize_with(staging, &mut move_file)
    }

    fn organize_with(
        &self,
        staging: &Path,
        mover: &mut dyn FnMut(&Path, &Path) -> Result<(), OrganizeError>,
    ) -> Result<OrganizeReport, OrganizeError> {
        let item_dir = locate_item_dir(staging)
            .ok_or_else(|| OrganizeError::MissingMetadata(staging.to_path_buf()))?;
        let item_json = item_dir.join(ITEM_JSON);
        let metadata = read_item_metadata(&item_json)?;

        let photos = find_photos(&item_dir)?;
        if photos.is_empty() {
            return Err(OrganizeError::NoPhotos(item_dir));
        }

        let seller_dir = self.seller_dir(&metadata.seller);
        fs::create_dir_all(&seller_dir).map_err(io_err(&seller_dir))?;
        let title = normalize_name(&metadata.title);
        debug!(
            target: "organizer",
            "{} / {} → {}",
            metadata.seller,
            metadata.title,
            seller_dir.display()
        );

        // (原路径, 目标路径)，失败时按此回滚
        let mut placed: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(photos.len() + 1);
        for (idx, photo) in photos.iter().enumerate() {
            let ext = photo
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_else(|| "jpg".to_string());
            let dest = reserve_destination(&seller_dir, &format!("{title}_{:03}", idx + 1), &ext);
            if let Err(err) = mover(photo, &dest) {
                roll_back(&placed, mover);
                return Err(err);
            }
            placed.push((photo.clone(), dest));
        }
        let files: Vec<PathBuf> = placed.iter().map(|(_, dest)| dest.clone()).collect();

        let metadata_file = if self.keep_item_json {
            let dest = reserve_destination(&seller_dir, &title, "json");
            if let Err(err) = mover(&item_json, &dest) {
                roll_back(&placed, mover);
                return Err(err);
            }
            Some(dest)
        } else {
            None
        };

        info!(
            target: "organizer",
            "已整理 {} 张图片到 {}",
            files.len(),
            seller_dir.display()
        );
        Ok(OrganizeReport {
            metadata,
            seller_dir,
            files,
            metadata_file,
        })
    }
}

/// `dir/stem.ext` 已存在时依次尝试 `stem_dup1.ext`、`stem_dup2.ext`……
pub fn reserve_destination(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let first = dir.join(format!("{stem}.{ext}"));
    if !first.exists() {
        return first;
    }
    let mut n = 1usize;
    loop {
        let candidate = dir.join(format!("{stem}_dup{n}.{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

pub fn read_item_metadata(path: &Path) -> Result<ItemMetadata, OrganizeError> {
    let raw = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            OrganizeError::MissingMetadata(path.to_path_buf())
        } else {
            OrganizeError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    let value: Value = serde_json::from_str(&raw).map_err(|source| OrganizeError::BadMetadata {
        path: path.to_path_buf(),
        source,
    })?;

    let seller = text_at(&value, &["user", "login"])
        .or_else(|| text_at(&value, &["login"]))
        .or_else(|| text_at(&value, &["seller", "login"]))
        .ok_or(OrganizeError::MissingField("user.login"))?;
    let title = text_at(&value, &["title"]).ok_or(OrganizeError::MissingField("title"))?;

    Ok(ItemMetadata {
        item_id: text_at(&value, &["id"]),
        seller,
        title,
    })
}

fn text_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut cur = value;
    for key in path {
        cur = cur.get(key)?;
    }
    let text = match cur {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// item.json 所在目录：暂存目录本身，或 `--save-in-dir` 产生的子目录。
fn locate_item_dir(staging: &Path) -> Option<PathBuf> {
    if staging.join(ITEM_JSON).is_file() {
        return Some(staging.to_path_buf());
    }
    let mut subdirs: Vec<PathBuf> = fs::read_dir(staging)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir() && p.join(ITEM_JSON).is_file())
        .collect();
    subdirs.sort();
    subdirs.into_iter().next()
}

fn find_photos(dir: &Path) -> Result<Vec<PathBuf>, OrganizeError> {
    let mut photos: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_err(dir))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_photo(p))
        .collect();
    photos.sort();
    Ok(photos)
}

fn is_photo(path: &Path) -> bool {
    let name_ok = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("photo_"));
    let ext_ok = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| PHOTO_EXTS.iter().any(|x| x.eq_ignore_ascii_case(e)));
    name_ok && ext_ok
}

/// 把已放进 closet 的文件移回原处。回滚失败只记日志，原错误优先返回。
fn roll_back(
    placed: &[(PathBuf, PathBuf)],
    mover: &mut dyn FnMut(&Path, &Path) -> Result<(), OrganizeError>,
) {
    for (origin, dest) in placed.iter().rev() {
        if let Err(err) = mover(dest, origin) {
            warn!(
                target: "organizer",
                "无法把 {} 移回 {}: {err}",
                dest.display(),
                origin.display()
            );
        }
    }
}

/// 同一文件系统内直接改名，跨文件系统时复制后删除。
fn move_file(src: &Path, dst: &Path) -> Result<(), OrganizeError> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    fs::copy(src, dst).map_err(io_err(dst))?;
    fs::remove_file(src).map_err(io_err(src))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn stage_item(dir: &Path, json: &str, photos: &[&str]) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(ITEM_JSON), json).unwrap();
        for p in photos {
            fs::write(dir.join(p), p.as_bytes()).unwrap();
        }
    }

    #[test]
    fn organizes_photos_into_seller_folder() {
        let root = TempDir::new().unwrap();
        let staging = root.path().join("stage");
        stage_item(
            &staging,
            r#"{"id": 4242, "title": "Giacca di jeans!", "user": {"login": "maria.rossi"}}"#,
            &["photo_2.jpg", "photo_1.webp", "avatar.png", "photo_3.PNG"],
        );

        let organizer = FileOrganizer::new(root.path().join("closet"), true);
        let report = organizer.organize(&staging).unwrap();

        let seller_dir = root.path().join("closet").join("mariarossi");
        assert_eq!(report.seller_dir, seller_dir);
        assert_eq!(report.metadata.item_id.as_deref(), Some("4242"));
        assert_eq!(
            report.files,
            vec![
                seller_dir.join("Giacca_di_jeans_001.webp"),
                seller_dir.join("Giacca_di_jeans_002.jpg"),
                seller_dir.join("Giacca_di_jeans_003.png"),
            ]
        );
        assert_eq!(
            fs::read_to_string(seller_dir.join("Giacca_di_jeans_001.webp")).unwrap(),
            "photo_1.webp"
        );
        assert_eq!(
            report.metadata_file,
            Some(seller_dir.join("Giacca_di_jeans.json"))
        );
        assert!(staging.join("avatar.png").exists());
    }

    #[test]
    fn same_name_twice_never_overwrites() {
        let root = TempDir::new().unwrap();
        let organizer = FileOrganizer::new(root.path().join("closet"), false);
        let json = r#"{"title": "Borsa", "login": "anna"}"#;

        let first = root.path().join("a");
        stage_item(&first, json, &["photo_1.jpg"]);
        let second = root.path().join("b");
        stage_item(&second, json, &["photo_1.jpg"]);

        let r1 = organizer.organize(&first).unwrap();
        let r2 = organizer.organize(&second).unwrap();

        let dir = root.path().join("closet").join("anna");
        assert_eq!(r1.files, vec![dir.join("Borsa_001.jpg")]);
        assert_eq!(r2.files, vec![dir.join("Borsa_001_dup1.jpg")]);
        assert!(r1.metadata_file.is_none());
    }

    #[test]
    fn finds_item_in_save_in_dir_subfolder() {
        let root = TempDir::new().unwrap();
        let staging = root.path().join("stage");
        stage_item(
            &staging.join("4242"),
            r#"{"title": "Felpa", "seller": {"login": "luca"}}"#,
            &["photo_1.jpeg"],
        );

        let organizer = FileOrganizer::new(root.path().join("closet"), true);
        let report = organizer.organize(&staging).unwrap();
        assert_eq!(report.metadata.seller, "luca");
        assert_eq!(
            report.files,
            vec![root.path().join("closet/luca/Felpa_001.jpeg")]
        );
    }

    #[test]
    fn missing_metadata_or_photos_is_an_error() {
        let root = TempDir::new().unwrap();
        let organizer = FileOrganizer::new(root.path().join("closet"), true);

        let empty = root.path().join("empty");
        fs::create_dir_all(&empty).unwrap();
        assert!(matches!(
            organizer.organize(&empty),
            Err(OrganizeError::MissingMetadata(_))
        ));

        let no_photos = root.path().join("nophotos");
        stage_item(&no_photos, r#"{"title": "x", "login": "y"}"#, &[]);
        assert!(matches!(
            organizer.organize(&no_photos),
            Err(OrganizeError::NoPhotos(_))
        ));

        let no_user = root.path().join("nouser");
        stage_item(&no_user, r#"{"title": "x"}"#, &["photo_1.jpg"]);
        assert!(matches!(
            organizer.organize(&no_user),
            Err(OrganizeError::MissingField("user.login"))
        ));
    }

    #[test]
    fn destination_uses_normalized_names() {
        let organizer = FileOrganizer::new("/c/closet", true);
        assert_eq!(
            organizer.destination_for("Bob Shop", "Scarpe (nuove)", 12, "webp"),
            PathBuf::from("/c/closet/Bob_Shop/Scarpe_nuove_012.webp")
        );
        assert_eq!(organizer.closet_name(), "closet");
    }

    #[test]
    fn failed_move_puts_placed_photos_back() {
        let root = TempDir::new().unwrap();
        let staging = root.path().join("stage");
        stage_item(
            &staging,
            r#"{"title": "Cappotto", "login": "giulia"}"#,
            &["photo_1.jpg", "photo_2.jpg", "photo_3.jpg"],
        );
        let organizer = FileOrganizer::new(root.path().join("closet"), true);

        let mut calls = 0;
        let mut mover = |src: &Path, dst: &Path| {
            calls += 1;
            if calls == 2 {
                return Err(OrganizeError::Io {
                    path: dst.to_path_buf(),
                    source: io::Error::other("disk full"),
                });
            }
            move_file(src, dst)
        };
        let err = organizer.organize_with(&staging, &mut mover).unwrap_err();
        assert!(matches!(err, OrganizeError::Io { .. }));

        let seller_dir = root.path().join("closet").join("giulia");
        assert_eq!(fs::read_dir(&seller_dir).unwrap().count(), 0);
        for name in ["photo_1.jpg", "photo_2.jpg", "photo_3.jpg", ITEM_JSON] {
            assert!(staging.join(name).is_file(), "{name} missing from staging");
        }

        // 重试时从 _001 开始，不产生 _dup 副本
        let report = organizer.organize(&staging).unwrap();
        assert_eq!(
            report.files,
            vec![
                seller_dir.join("Cappotto_001.jpg"),
                seller_dir.join("Cappotto_002.jpg"),
                seller_dir.join("Cappotto_003.jpg"),
            ]
        );
    }
}
