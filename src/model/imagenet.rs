// 该文件是 Shitu （识图） 项目的一部分。
// src/model/imagenet.rs - ImageNet 分类网络定义
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

#[cfg(feature = "rknpu")]
use std::path::Path;
use std::path::PathBuf;

#[cfg(feature = "rknpu")]
use rknpu::{Context, InitFlags, TensorType};
use thiserror::Error;
use tracing::error;
#[cfg(feature = "rknpu")]
use tracing::{debug, info};

use crate::{
  buffer::{DeviceView, RGBA_CHANNELS},
  model::{Classification, Classifier, LoadNetwork, Network},
};

#[cfg(feature = "rknpu")]
const IMAGENET_NUM_INPUTS: u32 = 1;
#[cfg(feature = "rknpu")]
const IMAGENET_NUM_OUTPUTS: u32 = 1;
const IMAGENET_INPUT_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum ImageNetError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(std::io::Error),
  #[error("标签加载错误: {0}")]
  LabelLoadError(std::io::Error),
  #[cfg(feature = "rknpu")]
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[cfg(feature = "rknpu")]
  #[error("RKNN 错误: {0}")]
  RknnError(rknpu::Error),
  #[error("NPU 运行时不可用（编译时未启用 rknpu 特性）")]
  RuntimeUnavailable,
}

impl From<std::io::Error> for ImageNetError {
  fn from(err: std::io::Error) -> Self {
    ImageNetError::ModelLoadError(err)
  }
}

#[cfg(feature = "rknpu")]
impl From<rknpu::Error> for ImageNetError {
  fn from(err: rknpu::Error) -> Self {
    ImageNetError::RknnError(err)
  }
}

#[cfg(feature = "rknpu")]
impl ImageNetError {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    ImageNetError::ModelInvalid(msg.to_string(), e)
  }
}

/// ImageNet 分类网络，封装推理上下文与标签表。
pub struct ImageNet {
  #[cfg(feature = "rknpu")]
  context: Context,
  labels: Box<[String]>,
  input_width: u32,
  input_height: u32,
}

impl ImageNet {
  /// 网络输入分辨率（宽 x 高）。
  pub fn input_resolution(&self) -> (u32, u32) {
    (self.input_width, self.input_height)
  }

  /// 标签表中的类别数量。
  pub fn num_classes(&self) -> usize {
    self.labels.len()
  }
}

/// ImageNet 网络加载器：按结构选择定位模型与标签文件。
#[derive(Debug, Clone)]
pub struct ImageNetLoader {
  model_dir: PathBuf,
}

impl Default for ImageNetLoader {
  fn default() -> Self {
    Self {
      model_dir: PathBuf::from("networks"),
    }
  }
}

impl ImageNetLoader {
  pub fn new(model_dir: impl Into<PathBuf>) -> Self {
    Self {
      model_dir: model_dir.into(),
    }
  }
}

impl LoadNetwork for ImageNetLoader {
  type Classifier = ImageNet;
  type Error = ImageNetError;

  #[cfg(feature = "rknpu")]
  fn load(&self, network: Network) -> Result<ImageNet, ImageNetError> {
    let model_path = self.model_dir.join(network.model_file());
    info!("加载模型文件: {}", model_path.display());
    let model_data = std::fs::read(&model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, InitFlags::default())?;
    info!("模型加载完成: {}", network);

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(ImageNetError::invalid("无法查询 SDK 版本", e));
      }
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| ImageNetError::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| ImageNetError::invalid("无法获取输出数量", e))?;

    if num_inputs != IMAGENET_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        IMAGENET_NUM_INPUTS, num_inputs
      );
      return Err(ImageNetError::invalid(
        &format!(
          "预期模型输入数量为 {}, 实际为 {}",
          IMAGENET_NUM_INPUTS, num_inputs
        ),
        rknpu::Error::InvalidModel,
      ));
    }

    if num_outputs != IMAGENET_NUM_OUTPUTS {
      error!(
        "预期模型输出数量为 {}, 实际为 {}",
        IMAGENET_NUM_OUTPUTS, num_outputs
      );
      return Err(ImageNetError::invalid(
        &format!(
          "预期模型输出数量为 {}, 实际为 {}",
          IMAGENET_NUM_OUTPUTS, num_outputs
        ),
        rknpu::Error::InvalidModel,
      ));
    }

    let labels = load_labels(&self.model_dir.join(network.labels_file()))?;
    info!("标签表加载完成: {} 个类别", labels.len());

    let (input_width, input_height) = network.input_size();
    Ok(ImageNet {
      context,
      labels,
      input_width,
      input_height,
    })
  }

  #[cfg(not(feature = "rknpu"))]
  fn load(&self, network: Network) -> Result<ImageNet, ImageNetError> {
    error!(
      "无法加载网络 {} (目录 {}): NPU 运行时不可用",
      network,
      self.model_dir.display()
    );
    Err(ImageNetError::RuntimeUnavailable)
  }
}

impl Classifier for ImageNet {
  type Error = ImageNetError;

  #[cfg(feature = "rknpu")]
  fn classify(
    &self,
    image: DeviceView<'_>,
    width: u32,
    height: u32,
  ) -> Result<Classification, ImageNetError> {
    debug!("设置模型输入");
    let input = network_input(image, width, height, self.input_width, self.input_height);
    self.context.set_input(
      0,
      &input,
      rknpu::TensorFormat::NHWC,
      TensorType::UInt8,
    )?;

    debug!("执行模型推理");
    self.context.run()?;

    debug!("获取模型输出");
    let output = self.context.get_outputs()?;
    let probs = output.get_f32(0)?;

    if probs.len() != self.labels.len() {
      error!(
        "输出张量大小与标签表不匹配: 张量 {}, 标签 {}",
        probs.len(),
        self.labels.len()
      );
    }

    let result = top_class(probs);
    debug!("分类结果: {:?}", result);
    Ok(result)
  }

  #[cfg(not(feature = "rknpu"))]
  fn classify(
    &self,
    _image: DeviceView<'_>,
    _width: u32,
    _height: u32,
  ) -> Result<Classification, ImageNetError> {
    Err(ImageNetError::RuntimeUnavailable)
  }

  fn describe(&self, class_index: i32) -> Option<&str> {
    if class_index < 0 {
      return None;
    }
    self.labels.get(class_index as usize).map(String::as_str)
  }
}

/// 读取 ILSVRC 标签表。
#[cfg(feature = "rknpu")]
fn load_labels(path: &Path) -> Result<Box<[String]>, ImageNetError> {
  let text = std::fs::read_to_string(path).map_err(ImageNetError::LabelLoadError)?;
  Ok(parse_labels(&text))
}

/// 解析标签表文本。每行为 “synset 编号 + 空格 + 描述”；
/// 没有空格的行整行作为描述；空行跳过。
#[cfg_attr(not(feature = "rknpu"), allow(dead_code))]
fn parse_labels(text: &str) -> Box<[String]> {
  text
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty())
    .map(|line| match line.split_once(' ') {
      Some((_, desc)) => desc.trim().to_string(),
      None => line.to_string(),
    })
    .collect()
}

/// 将 RGBA 浮点图像重采样为网络输入分辨率的 NHWC RGB 字节张量。
/// 使用最近邻采样；通道取值按 0 - 255 截断，丢弃透明通道。
#[cfg_attr(not(feature = "rknpu"), allow(dead_code))]
fn network_input(
  image: DeviceView<'_>,
  width: u32,
  height: u32,
  net_w: u32,
  net_h: u32,
) -> Vec<u8> {
  let src = image.as_slice();
  let mut out = Vec::with_capacity(IMAGENET_INPUT_CHANNELS * net_w as usize * net_h as usize);

  for y in 0..net_h {
    let src_y = (y as u64 * height as u64 / net_h as u64) as usize;
    for x in 0..net_w {
      let src_x = (x as u64 * width as u64 / net_w as u64) as usize;
      let base = (src_y * width as usize + src_x) * RGBA_CHANNELS;
      for c in 0..IMAGENET_INPUT_CHANNELS {
        out.push(src[base + c].clamp(0.0, 255.0) as u8);
      }
    }
  }

  out
}

/// 在输出概率分布中取最大值，返回类别索引与置信度。
/// 空分布返回索引 -1。
#[cfg_attr(not(feature = "rknpu"), allow(dead_code))]
fn top_class(probs: &[f32]) -> Classification {
  let mut best = Classification {
    class_index: -1,
    confidence: 0.0,
  };

  for (index, &prob) in probs.iter().enumerate() {
    if best.class_index < 0 || prob > best.confidence {
      best = Classification {
        class_index: index as i32,
        confidence: prob,
      };
    }
  }

  best
}
