// 该文件是 Huishou （回收分类） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Huishou Authors

use std::{
  collections::VecDeque,
  path::{Path, PathBuf},
};

use image::{ImageFormat, ImageReader};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{InvalidImageError, RgbFrame},
  task::Skippable,
  url_path,
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error {path}: {source}")]
  IoError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Image loading error {path}: {source}")]
  ImageLoadError {
    path: PathBuf,
    #[source]
    source: InvalidImageError,
  },
  #[error("No image file found in {0}")]
  NoImages(PathBuf),
}

impl Skippable for ImageFileInputError {
  /// 单个文件读不出来不影响目录中的其它文件
  fn skippable(&self) -> bool {
    matches!(
      self,
      ImageFileInputError::ImageLoadError { .. } | ImageFileInputError::IoError { .. }
    )
  }
}

/// 单个图像文件，或目录下按文件名排序的全部图像文件
pub struct ImageFileInput {
  paths: VecDeque<PathBuf>,
  index: u64,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    Self::from_path(url_path(url))
  }
}

impl ImageFileInput {
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let io_error = |source| ImageFileInputError::IoError {
      path: path.to_path_buf(),
      source,
    };

    let metadata = std::fs::metadata(path).map_err(io_error)?;
    let paths = if metadata.is_dir() {
      let mut paths = Vec::new();
      for entry in std::fs::read_dir(path).map_err(io_error)? {
        let entry_path = entry.map_err(io_error)?.path();
        if entry_path.is_file() && ImageFormat::from_path(&entry_path).is_ok() {
          paths.push(entry_path);
        } else {
          debug!("跳过非图像文件: {}", entry_path.display());
        }
      }
      if paths.is_empty() {
        return Err(ImageFileInputError::NoImages(path.to_path_buf()));
      }
      paths.sort();
      paths
    } else {
      vec![path.to_path_buf()]
    };

    debug!("共 {} 个图像文件待处理", paths.len());
    Ok(ImageFileInput {
      paths: paths.into(),
      index: 0,
    })
  }

  pub fn remaining(&self) -> usize {
    self.paths.len()
  }

  fn read(path: &Path) -> Result<RgbFrame, ImageFileInputError> {
    let image = ImageReader::open(path)
      .map_err(|source| ImageFileInputError::IoError {
        path: path.to_path_buf(),
        source,
      })?
      .with_guessed_format()
      .map_err(|source| ImageFileInputError::IoError {
        path: path.to_path_buf(),
        source,
      })?
      .decode()
      .map_err(|e| ImageFileInputError::ImageLoadError {
        path: path.to_path_buf(),
        source: InvalidImageError::from(e),
      })?;

    RgbFrame::from_dynamic(image).map_err(|source| ImageFileInputError::ImageLoadError {
      path: path.to_path_buf(),
      source,
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<RgbFrame, ImageFileInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.paths.pop_front()?;
    let index = self.index;
    self.index += 1;
    Some(Self::read(&path).map(|frame| {
      frame
        .with_origin(path.display().to_string())
        .with_index(index)
    }))
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    (self.paths.len(), Some(self.paths.len()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn reads_single_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("can.png");
    RgbImage::from_pixel(8, 6, Rgb([1, 2, 3])).save(&path).unwrap();

    let mut input = ImageFileInput::from_path(&path).unwrap();
    let frame = input.next().unwrap().unwrap();
    assert_eq!((frame.width(), frame.height()), (8, 6));
    assert_eq!(frame.origin(), path.display().to_string());
    assert!(input.next().is_none());
  }

  #[test]
  fn directory_is_sorted_and_filtered() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::new(2, 2).save(dir.path().join("b.png")).unwrap();
    RgbImage::new(2, 2).save(dir.path().join("a.png")).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

    let input = ImageFileInput::from_path(dir.path()).unwrap();
    assert_eq!(input.remaining(), 2);
    let origins: Vec<String> = input
      .map(|frame| frame.unwrap().origin().to_string())
      .collect();
    assert!(origins[0].ends_with("a.png"));
    assert!(origins[1].ends_with("b.png"));
  }

  #[test]
  fn corrupt_file_yields_error_and_stream_continues() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.png"), b"broken").unwrap();
    RgbImage::new(2, 2).save(dir.path().join("b.png")).unwrap();

    let mut input = ImageFileInput::from_path(dir.path()).unwrap();
    assert!(matches!(
      input.next(),
      Some(Err(ImageFileInputError::ImageLoadError { .. }))
    ));
    assert!(input.next().unwrap().is_ok());
  }

  #[test]
  fn empty_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      ImageFileInput::from_path(dir.path()),
      Err(ImageFileInputError::NoImages(_))
    ));
  }

  #[test]
  fn unreadable_files_are_skippable() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.png"), b"broken").unwrap();
    RgbImage::new(2, 2).save(dir.path().join("b.png")).unwrap();

    let mut input = ImageFileInput::from_path(dir.path()).unwrap();
    std::fs::remove_file(dir.path().join("b.png")).unwrap();
    assert!(input.next().unwrap().unwrap_err().skippable());
    let missing = input.next().unwrap().unwrap_err();
    assert!(matches!(missing, ImageFileInputError::IoError { .. }));
    assert!(missing.skippable());

    assert!(!ImageFileInputError::SchemaMismatch.skippable());
    assert!(!ImageFileInputError::NoImages(dir.path().to_path_buf()).skippable());
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("v4l:///dev/video0").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }
}
