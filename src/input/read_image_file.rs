// 该文件是 Shitu （识图） 项目的一部分。
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
// Copyright (C) 2026 The Shitu Contributors

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, info};

use crate::{buffer::SharedImage, input::ImageLoader};

#[derive(Error, Debug)]
pub enum ImageFileLoadError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像解码错误: {0}")]
  DecodeError(image::ImageError),
}

impl From<std::io::Error> for ImageFileLoadError {
  fn from(err: std::io::Error) -> Self {
    ImageFileLoadError::IoError(err)
  }
}

impl From<image::ImageError> for ImageFileLoadError {
  fn from(err: image::ImageError) -> Self {
    ImageFileLoadError::DecodeError(err)
  }
}

/// 图像文件加载器。
///
/// 解码为每通道 32 位的 RGBA 浮点像素，通道取值范围 0.0 - 255.0。
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageFileLoader;

impl ImageLoader for ImageFileLoader {
  type Error = ImageFileLoadError;

  fn load(&self, path: &str) -> Result<SharedImage, Self::Error> {
    info!("加载图像文件: {}", path);
    let image = ImageReader::open(path)?.decode()?;

    let rgba = image.to_rgba32f();
    let (width, height) = rgba.dimensions();
    debug!("图像尺寸: {}x{}", width, height);

    // to_rgba32f 的通道取值为 0.0 - 1.0，统一换算到 0.0 - 255.0
    let mut data = rgba.into_raw();
    for value in &mut data {
      *value *= 255.0;
    }

    Ok(SharedImage::from_rgba(data, width, height))
  }
}
