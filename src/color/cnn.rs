//! CNN 颜色分类器
//!
//! 网络结构固定：三组 (3x3 卷积 + ReLU → 2x2 最大池化)，卷积核数量依次为 32、64、128，
//! 之后展平，经过 dropout(0.5)、128 单元全连接、dropout(0.3)，最后是 3 类 softmax。
//! 输入为检测区域缩放到 64x64 的 RGB 图像，NHWC 排布，值域 [0, 1]；
//! 输出按 `[blue, purple, other]` 顺序给出概率。
//!
//! 模型以 ONNX 文件形式提供，由调用方加载后注入。

use std::collections::BTreeMap;
use std::path::Path;

use image::RgbaImage;
use ort::session::Session;
use tracing::debug;

use crate::color::bounds::BoundingBox;
use crate::color::classifier::{ColorClassifier, ColorLabel, ColorMethod, ColorResult};
use crate::color::image::{PixelRegion, crop_resized, rgba_to_nhwc};
use crate::color::infer::run_inference;
use crate::color::model::load_model;
use crate::config::{CNN_CLASS_COUNT, CNN_INPUT_SIZE};
use crate::error::{Result, TubeError};

/// 网络输出的类别顺序
pub const CNN_CLASSES: [ColorLabel; CNN_CLASS_COUNT] =
    [ColorLabel::Blue, ColorLabel::Purple, ColorLabel::Other];

pub struct CnnColorClassifier {
    session: Session,
    input_size: u32,
}

impl CnnColorClassifier {
    /// 使用已初始化的推理会话创建分类器
    pub fn new(session: Session) -> Self {
        Self {
            session,
            input_size: CNN_INPUT_SIZE,
        }
    }

    /// 从 ONNX 文件加载分类网络
    pub fn from_file(model_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(load_model(model_path)?))
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    /// 裁剪检测区域并运行网络，返回各类别概率
    pub fn predict(&mut self, image: &RgbaImage, bbox: &BoundingBox) -> Result<Vec<f32>> {
        let region = PixelRegion::from_bbox(bbox, image.width(), image.height());
        if region.is_empty() {
            return Err(TubeError::EmptyRegion(*bbox));
        }
        let crop = crop_resized(image, region, self.input_size);
        let input = rgba_to_nhwc(&crop);
        let output = run_inference(&mut self.session, &input)?;
        Ok(output.data().to_vec())
    }
}

/// 将网络输出的概率解释为颜色结果
///
/// 取概率最大的类别，置信度为该概率乘以 100 后取整。
/// 概率中出现非有限值时返回 `Unknown`，置信度为 0。
///
/// # 错误处理
/// 输出长度不是 3 时返回 `TubeError::InvalidOutput`
pub fn interpret_probabilities(probabilities: &[f32]) -> Result<ColorResult> {
    if probabilities.len() != CNN_CLASS_COUNT {
        return Err(TubeError::InvalidOutput(format!(
            "颜色分类网络应输出 {} 个概率, 实际为 {}",
            CNN_CLASS_COUNT,
            probabilities.len()
        )));
    }

    let percent = |p: f32| (p * 100.0).round().clamp(0.0, 100.0) as u32;

    if probabilities.iter().any(|p| !p.is_finite()) {
        let votes = CNN_CLASSES
            .iter()
            .map(|label| (label.as_str().to_string(), 0))
            .collect();
        return Ok(ColorResult::new(ColorLabel::Unknown, 0, votes));
    }

    let (best, probability) = probabilities
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::MIN), |best, (index, p)| if p > best.1 { (index, p) } else { best });

    let votes: BTreeMap<String, u32> = CNN_CLASSES
        .iter()
        .zip(probabilities)
        .map(|(label, &p)| (label.as_str().to_string(), percent(p)))
        .collect();

    Ok(ColorResult::new(CNN_CLASSES[best], percent(probability) as u8, votes))
}

impl ColorClassifier for CnnColorClassifier {
    fn method(&self) -> ColorMethod {
        ColorMethod::Cnn
    }

    fn classify(&mut self, image: &RgbaImage, bbox: &BoundingBox) -> Result<ColorResult> {
        let probabilities = self.predict(image, bbox)?;
        let result = interpret_probabilities(&probabilities)?;
        debug!(
            "CNN 预测: {} ({}%), 得分: {:?}",
            result.label.as_str(),
            result.confidence,
            result.votes
        );
        Ok(result)
    }
}
