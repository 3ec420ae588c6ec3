// 该文件是 Shitu （识图） 项目的一部分。
// src/model.rs - 模型
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

use crate::buffer::DeviceView;

/// 预训练识别网络的结构选择。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
  /// GoogleNet（默认）
  #[default]
  Googlenet,
  /// AlexNet
  Alexnet,
  /// GoogleNet，ILSVRC12 子集版
  Googlenet12,
}

impl Network {
  /// 该结构对应的模型文件名。
  pub fn model_file(&self) -> &'static str {
    match self {
      Network::Googlenet => "googlenet.rknn",
      Network::Alexnet => "alexnet.rknn",
      Network::Googlenet12 => "googlenet_12.rknn",
    }
  }

  /// 该结构对应的标签表文件名。
  pub fn labels_file(&self) -> &'static str {
    match self {
      Network::Googlenet12 => "ilsvrc12_synset_words_subset.txt",
      _ => "ilsvrc12_synset_words.txt",
    }
  }

  /// 网络输入分辨率（宽 x 高）。
  pub fn input_size(&self) -> (u32, u32) {
    (224, 224)
  }
}

impl std::fmt::Display for Network {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Network::Googlenet => "GoogleNet",
      Network::Alexnet => "AlexNet",
      Network::Googlenet12 => "GoogleNet-12",
    };
    write!(f, "{}", name)
  }
}

/// 单次分类结果。
///
/// `class_index` 为 -1 表示分类失败；非负值为标签表的有效索引。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
  pub class_index: i32,
  pub confidence: f32,
}

impl Classification {
  pub fn is_valid(&self) -> bool {
    self.class_index >= 0
  }
}

/// 分类器 trait：对一帧 RGBA 浮点图像执行一次前向推理。
pub trait Classifier {
  type Error: std::error::Error;

  /// 对加速器侧视图执行分类，返回类别索引与置信度（0.0 - 1.0）。
  fn classify(
    &self,
    image: DeviceView<'_>,
    width: u32,
    height: u32,
  ) -> Result<Classification, Self::Error>;

  /// 查询类别索引对应的文字描述。
  fn describe(&self, class_index: i32) -> Option<&str>;
}

/// 网络加载器 trait：按结构选择创建分类器实例。
pub trait LoadNetwork {
  type Classifier: Classifier;
  type Error: std::error::Error;

  fn load(&self, network: Network) -> Result<Self::Classifier, Self::Error>;
}

mod imagenet;
pub use self::imagenet::{ImageNet, ImageNetError, ImageNetLoader};
