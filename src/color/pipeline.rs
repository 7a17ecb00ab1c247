use std::collections::BTreeMap;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::color::bounds::{BoundingBox, RawDetection};
use crate::color::classifier::{ColorClassifier, ColorLabel, ColorMethod, ColorResult};
use crate::color::cnn::CnnColorClassifier;
use crate::color::hsv::HsvColorClassifier;
use crate::color::nms::suppress;
use crate::color::tensor::{RawOutputTensor, decode};
use crate::config::PipelineConfig;
use crate::error::Result;

/// 检测结果的颜色信息，按界面所需的 JSON 格式序列化
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorAnnotation {
    #[serde(rename = "type")]
    pub label: ColorLabel,
    pub confidence: u8,
    pub name: String,
    #[serde(rename = "displayColor")]
    pub display_color: String,
    pub emoji: String,
    pub method: ColorMethod,
    pub details: BTreeMap<String, u32>,
    /// 颜色分析失败、使用了默认结果
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

impl ColorAnnotation {
    pub fn new(result: ColorResult, method: ColorMethod, fallback: bool) -> Self {
        let display = result.label.display();
        Self {
            label: result.label,
            confidence: result.confidence,
            name: display.name.to_string(),
            display_color: display.hex.to_string(),
            emoji: display.emoji.to_string(),
            method,
            details: result.votes,
            fallback,
        }
    }
}

/// 流水线的输出单元：检测结果加颜色信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedDetection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
    pub color: ColorAnnotation,
}

impl AnnotatedDetection {
    pub fn new(detection: RawDetection, color: ColorAnnotation) -> Self {
        Self {
            bbox: detection.bbox,
            confidence: detection.confidence,
            class_id: detection.class_id,
            class_name: detection.class_name,
            color,
        }
    }
}

/// 检测后处理与颜色分类流水线
///
/// 每次调用独立处理一帧：解码 → 置信度过滤 → NMS → 逐个检测做颜色分类。
/// 颜色分类器由调用方注入，流水线不负责加载模型。
pub struct DetectionPipeline {
    config: PipelineConfig,
    classifier: Box<dyn ColorClassifier>,
}

impl DetectionPipeline {
    pub fn new(config: PipelineConfig, classifier: Box<dyn ColorClassifier>) -> Self {
        Self { config, classifier }
    }

    /// 按配置选择颜色分类器
    ///
    /// 配置为 CNN 但模型不可用时退回 HSV 分类器。
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let classifier: Box<dyn ColorClassifier> = match config.color_method {
            ColorMethod::Hsv => Box::new(HsvColorClassifier::new()),
            ColorMethod::Cnn => match config.color_model_path.as_deref() {
                Some(path) => match CnnColorClassifier::from_file(path) {
                    Ok(cnn) => {
                        info!("CNN 颜色分类器已加载: {}", path.display());
                        Box::new(cnn)
                    }
                    Err(e) => {
                        warn!("CNN 颜色分类器加载失败, 使用 HSV 分析: {}", e);
                        Box::new(HsvColorClassifier::new())
                    }
                },
                None => {
                    warn!("未配置 CNN 颜色分类模型, 使用 HSV 分析");
                    Box::new(HsvColorClassifier::new())
                }
            },
        };
        Ok(Self::new(config, classifier))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn method(&self) -> ColorMethod {
        self.classifier.method()
    }

    /// 更新置信度与 IoU 阈值
    ///
    /// # 错误处理
    /// 阈值不在 [0, 1] 内（含 NaN）时返回 `TubeError::Config`，原阈值保持不变
    pub fn set_thresholds(&mut self, confidence_threshold: f32, iou_threshold: f32) -> Result<()> {
        let config = self
            .config
            .clone()
            .with_confidence_threshold(confidence_threshold)
            .with_iou_threshold(iou_threshold);
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// 处理一帧模型输出
    ///
    /// # 参数
    /// * `tensor` - 检测模型的原始输出
    /// * `image` - 原始图像的 RGBA 像素缓冲，其尺寸即原始图像尺寸
    ///
    /// # 返回值
    /// 返回互不重叠（IoU 不超过阈值）的带颜色检测结果，按置信度降序
    pub fn run(&mut self, tensor: &RawOutputTensor, image: &RgbaImage) -> Vec<AnnotatedDetection> {
        let detections = decode(
            tensor,
            self.config.confidence_threshold,
            image.width() as f32,
            image.height() as f32,
            self.config.input_width(),
            self.config.input_height(),
            &self.config.class_names,
        );
        let detections = suppress(
            detections,
            self.config.iou_threshold,
            self.config.max_detections,
        );
        debug!("NMS 后剩余 {} 个检测", detections.len());
        self.annotate(detections, image)
    }

    /// 对已经过 NMS 的检测逐个做颜色分类
    ///
    /// 单个检测分类失败时使用默认颜色，不影响其它检测。
    pub fn annotate(
        &mut self,
        detections: Vec<RawDetection>,
        image: &RgbaImage,
    ) -> Vec<AnnotatedDetection> {
        let method = self.classifier.method();
        detections
            .into_iter()
            .enumerate()
            .map(|(index, detection)| {
                let color = match self.classifier.classify(image, &detection.bbox) {
                    Ok(result) => {
                        debug!(
                            "检测 {} 颜色: {} ({}%)",
                            index + 1,
                            result.label.as_str(),
                            result.confidence
                        );
                        ColorAnnotation::new(result, method, false)
                    }
                    Err(e) => {
                        error!("检测 {} 颜色分析失败: {}", index, e);
                        ColorAnnotation::new(ColorResult::fallback(), method, true)
                    }
                };
                AnnotatedDetection::new(detection, color)
            })
            .collect()
    }
}
