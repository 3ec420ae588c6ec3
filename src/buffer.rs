// 该文件是 Shitu （识图） 项目的一部分。
// src/buffer.rs - RGBA 浮点图像缓冲区定义
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

pub const RGBA_CHANNELS: usize = 4;

/// 解码后的图像，以每通道 32 位的 RGBA 浮点像素保存，
/// 通道取值范围 0.0 - 255.0。
///
/// 同一块物理分配通过两个视图暴露：主机侧视图（[`SharedImage::host`]）
/// 与加速器侧视图（[`SharedImage::device`]）。两个视图引用同一份内存，
/// 因此任意时刻描述的像素数据逐像素一致。
/// 缓冲区为单一所有者，随作用域结束自动释放。
#[derive(Debug, Clone)]
pub struct SharedImage {
  data: Box<[f32]>,
  width: u32,
  height: u32,
}

/// 加速器侧的只读视图，与主机侧视图共享同一块内存。
#[derive(Debug, Clone, Copy)]
pub struct DeviceView<'a> {
  data: &'a [f32],
}

impl<'a> DeviceView<'a> {
  pub fn as_slice(&self) -> &'a [f32] {
    self.data
  }

  pub fn as_ptr(&self) -> *const f32 {
    self.data.as_ptr()
  }
}

impl SharedImage {
  /// 由 RGBA 浮点数据构造图像缓冲区。
  pub fn from_rgba(data: Vec<f32>, width: u32, height: u32) -> Self {
    let expected = RGBA_CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      panic!(
        "数据长度不匹配: 期望长度 {}, 实际长度 {}",
        expected,
        data.len()
      );
    }

    Self {
      data: data.into_boxed_slice(),
      width,
      height,
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn channels(&self) -> usize {
    RGBA_CHANNELS
  }

  /// 主机侧视图。
  pub fn host(&self) -> &[f32] {
    &self.data
  }

  /// 加速器侧视图，与 [`SharedImage::host`] 指向同一块内存。
  pub fn device(&self) -> DeviceView<'_> {
    DeviceView { data: &self.data }
  }
}
