// 该文件是 Shitu （识图） 项目的一部分。
// src/run.rs - 识别流程编排
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

use std::io::Write;

use tracing::{debug, error, info};

use crate::{
  input::ImageLoader,
  model::{Classifier, LoadNetwork, Network},
};

/// 识别流程编排：加载图像、加载网络、执行一次分类并输出结果。
///
/// 面向用户的消息全部写入 `out`（通常为标准输出）；
/// 诊断信息走 tracing。无论成功与否，返回值恒为 0，
/// 与原示例程序的约定一致：缺少参数视为求助而非错误，
/// 各失败路径打印消息后照常结束。
pub fn run<W, L, N>(
  out: &mut W,
  prog: &str,
  image_arg: Option<&str>,
  loader: &L,
  networks: &N,
  network: Network,
) -> i32
where
  W: Write,
  L: ImageLoader,
  N: LoadNetwork,
{
  // 期望恰好一个图像文件名参数
  let Some(filename) = image_arg else {
    let _ = writeln!(out, "{}: expected image filename as argument", prog);
    let _ = writeln!(out, "example usage:   {} my_image.jpg", prog);
    return 0;
  };

  // 加载图像，得到主机/加速器双视图共享缓冲区
  let image = match loader.load(filename) {
    Ok(image) => image,
    Err(e) => {
      error!("图像加载失败: {}", e);
      let _ = writeln!(out, "failed to load image '{}'", filename);
      return 0;
    }
  };
  info!("图像加载完成: {}x{}", image.width(), image.height());

  // 加载识别网络
  let classifier = match networks.load(network) {
    Ok(classifier) => classifier,
    Err(e) => {
      error!("网络加载失败: {}", e);
      let _ = writeln!(out, "failed to load image recognition network");
      return 0;
    }
  };

  // 对加速器侧视图执行一次前向推理
  let now = std::time::Instant::now();
  let result = match classifier.classify(image.device(), image.width(), image.height()) {
    Ok(result) => result,
    Err(e) => {
      error!("推理执行失败: {}", e);
      let _ = writeln!(out, "failed to classify image");
      return 0;
    }
  };
  debug!("推理完成，耗时: {:.2?}", now.elapsed());

  if result.is_valid() {
    let label = classifier.describe(result.class_index).unwrap_or("unknown");
    let _ = writeln!(
      out,
      "image is recognized as '{}' (class #{}) with {:.2}% confidence",
      label,
      result.class_index,
      result.confidence * 100.0
    );
  } else {
    let _ = writeln!(out, "failed to classify image");
  }

  // 分类器与图像缓冲区随作用域结束释放
  0
}

#[cfg(test)]
mod tests {
  use std::{
    cell::{Cell, RefCell},
    rc::Rc,
  };

  use thiserror::Error;

  use super::*;
  use crate::{
    buffer::{DeviceView, SharedImage},
    model::Classification,
  };

  #[derive(Error, Debug)]
  #[error("桩错误")]
  struct StubError;

  struct StubLoader {
    fail: bool,
  }

  impl ImageLoader for StubLoader {
    type Error = StubError;

    fn load(&self, _path: &str) -> Result<SharedImage, StubError> {
      if self.fail {
        Err(StubError)
      } else {
        Ok(SharedImage::from_rgba(vec![0.0; 16], 2, 2))
      }
    }
  }

  struct StubClassifier {
    result: Result<Classification, ()>,
    labels: Vec<&'static str>,
    classify_calls: Rc<Cell<usize>>,
    describe_calls: Rc<Cell<usize>>,
    drops: Rc<Cell<usize>>,
  }

  impl Classifier for StubClassifier {
    type Error = StubError;

    fn classify(
      &self,
      _image: DeviceView<'_>,
      _width: u32,
      _height: u32,
    ) -> Result<Classification, StubError> {
      self.classify_calls.set(self.classify_calls.get() + 1);
      self.result.map_err(|_| StubError)
    }

    fn describe(&self, class_index: i32) -> Option<&str> {
      self.describe_calls.set(self.describe_calls.get() + 1);
      self.labels.get(class_index as usize).copied()
    }
  }

  impl Drop for StubClassifier {
    fn drop(&mut self) {
      self.drops.set(self.drops.get() + 1);
    }
  }

  struct StubNetworks {
    classifier: RefCell<Option<StubClassifier>>,
    calls: Rc<Cell<usize>>,
  }

  impl StubNetworks {
    fn failing(calls: Rc<Cell<usize>>) -> Self {
      Self {
        classifier: RefCell::new(None),
        calls,
      }
    }

    fn with(classifier: StubClassifier, calls: Rc<Cell<usize>>) -> Self {
      Self {
        classifier: RefCell::new(Some(classifier)),
        calls,
      }
    }
  }

  impl LoadNetwork for StubNetworks {
    type Classifier = StubClassifier;
    type Error = StubError;

    fn load(&self, _network: Network) -> Result<StubClassifier, StubError> {
      self.calls.set(self.calls.get() + 1);
      self.classifier.borrow_mut().take().ok_or(StubError)
    }
  }

  fn counter() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
  }

  struct Counters {
    classify: Rc<Cell<usize>>,
    describe: Rc<Cell<usize>>,
    drops: Rc<Cell<usize>>,
  }

  fn classifier(
    result: Result<Classification, ()>,
    labels: Vec<&'static str>,
  ) -> (StubClassifier, Counters) {
    let counters = Counters {
      classify: counter(),
      describe: counter(),
      drops: counter(),
    };
    let classifier = StubClassifier {
      result,
      labels,
      classify_calls: counters.classify.clone(),
      describe_calls: counters.describe.clone(),
      drops: counters.drops.clone(),
    };
    (classifier, counters)
  }

  fn run_with(
    image_arg: Option<&str>,
    loader: &StubLoader,
    networks: &StubNetworks,
  ) -> (i32, String) {
    let mut out = Vec::new();
    let code = run(
      &mut out,
      "shitu",
      image_arg,
      loader,
      networks,
      Network::default(),
    );
    (code, String::from_utf8(out).unwrap())
  }

  #[test]
  fn missing_argument_prints_usage_and_succeeds() {
    let factory_calls = counter();
    let networks = StubNetworks::failing(factory_calls.clone());

    let (code, out) = run_with(None, &StubLoader { fail: false }, &networks);

    assert_eq!(code, 0);
    assert!(out.contains("shitu: expected image filename as argument"));
    assert!(out.contains("example usage:   shitu my_image.jpg"));
    assert_eq!(factory_calls.get(), 0);
  }

  #[test]
  fn load_failure_names_the_file_and_skips_the_factory() {
    let factory_calls = counter();
    let networks = StubNetworks::failing(factory_calls.clone());

    let (code, out) = run_with(Some("missing.jpg"), &StubLoader { fail: true }, &networks);

    assert_eq!(code, 0);
    assert!(out.contains("failed to load image 'missing.jpg'"));
    assert_eq!(factory_calls.get(), 0);
  }

  #[test]
  fn network_load_failure_skips_classification() {
    let factory_calls = counter();
    let networks = StubNetworks::failing(factory_calls.clone());

    let (code, out) = run_with(Some("cat.jpg"), &StubLoader { fail: false }, &networks);

    assert_eq!(code, 0);
    assert!(out.contains("failed to load image recognition network"));
    assert_eq!(factory_calls.get(), 1);
  }

  #[test]
  fn invalid_class_index_reports_failure_without_label_lookup() {
    let factory_calls = counter();
    let (stub, counters) = classifier(
      Ok(Classification {
        class_index: -1,
        confidence: 0.0,
      }),
      vec!["tench"],
    );
    let networks = StubNetworks::with(stub, factory_calls.clone());

    let (code, out) = run_with(Some("cat.jpg"), &StubLoader { fail: false }, &networks);

    assert_eq!(code, 0);
    assert!(out.contains("failed to classify image"));
    assert_eq!(counters.classify.get(), 1);
    assert_eq!(counters.describe.get(), 0);
    assert_eq!(counters.drops.get(), 1);
  }

  #[test]
  fn classifier_error_reports_failure_and_still_releases() {
    let factory_calls = counter();
    let (stub, counters) = classifier(Err(()), vec![]);
    let networks = StubNetworks::with(stub, factory_calls.clone());

    let (code, out) = run_with(Some("cat.jpg"), &StubLoader { fail: false }, &networks);

    assert_eq!(code, 0);
    assert!(out.contains("failed to classify image"));
    assert_eq!(counters.describe.get(), 0);
    assert_eq!(counters.drops.get(), 1);
  }

  #[test]
  fn successful_classification_reports_label_index_and_confidence() {
    let factory_calls = counter();
    let (stub, counters) = classifier(
      Ok(Classification {
        class_index: 5,
        confidence: 0.873,
      }),
      vec!["", "", "", "", "", "cat"],
    );
    let networks = StubNetworks::with(stub, factory_calls.clone());

    let (code, out) = run_with(Some("cat.jpg"), &StubLoader { fail: false }, &networks);

    assert_eq!(code, 0);
    assert!(out.contains("image is recognized as 'cat' (class #5) with 87.30% confidence"));
    assert_eq!(counters.classify.get(), 1);
    assert_eq!(counters.describe.get(), 1);
    assert_eq!(counters.drops.get(), 1);
  }

  #[test]
  fn missing_label_falls_back_to_unknown() {
    let factory_calls = counter();
    let (stub, _counters) = classifier(
      Ok(Classification {
        class_index: 3,
        confidence: 0.5,
      }),
      vec![],
    );
    let networks = StubNetworks::with(stub, factory_calls.clone());

    let (_code, out) = run_with(Some("cat.jpg"), &StubLoader { fail: false }, &networks);

    assert!(out.contains("image is recognized as 'unknown' (class #3)"));
  }
}
