use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::color::ColorMethod;
use crate::error::{Result, TubeError};

pub const DEFAULT_CLASS_LABEL: &str = "test_tube";
pub const DEMO_CLASS_LABEL: &str = "test_tube (demo)";

// 目标检测超参数配置
pub const DEFAULT_INPUT_SHAPE: [usize; 4] = [1, 3, 640, 640];
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.2;
/// 单帧最多解析的候选框数量，与形状元数据无关
pub const MAX_CANDIDATES: usize = 8400;
/// 单条检测至少包含 cx, cy, w, h, conf 五个值
pub const MIN_DETECTION_VALUES: usize = 5;

// 颜色分析参数
pub const MAX_COLOR_SAMPLES: usize = 1000;
pub const ALPHA_THRESHOLD: u8 = 128;
pub const CENTER_OFFSET_RATIO: f32 = 0.3;
pub const CENTER_SIZE_RATIO: f32 = 0.4;
pub const MIN_COLOR_CONFIDENCE: u8 = 30;
pub const FALLBACK_COLOR_CONFIDENCE: u8 = 50;

// CNN 颜色分类器
pub const CNN_INPUT_SIZE: u32 = 64;
pub const CNN_CLASS_COUNT: usize = 3;

// 推理会话
pub const SESSION_INTRA_THREADS: usize = 4;

/// 检测流水线配置
///
/// 所有字段都有默认值，可以从 JSON 文件中只覆盖部分字段。
///
/// # 示例
///
/// ```
/// use tubehue::config::PipelineConfig;
///
/// let config = PipelineConfig::default()
///     .with_confidence_threshold(0.6)
///     .with_iou_threshold(0.3);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 置信度阈值，低于此值的候选框将被丢弃
    pub confidence_threshold: f32,
    /// NMS 的 IoU 阈值，严格大于此值的重叠框会被抑制
    pub iou_threshold: f32,
    /// 检测模型输入形状 (N, C, H, W)
    pub model_input_shape: [usize; 4],
    /// 颜色分类方法
    pub color_method: ColorMethod,
    /// NMS 之后最多保留的检测数量
    pub max_detections: Option<usize>,
    /// 类别名称表，按类别 ID 索引
    pub class_names: Vec<String>,
    pub detector_model_path: Option<PathBuf>,
    pub color_model_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            model_input_shape: DEFAULT_INPUT_SHAPE,
            color_method: ColorMethod::Hsv,
            max_detections: None,
            class_names: vec![DEFAULT_CLASS_LABEL.to_string()],
            detector_model_path: None,
            color_model_path: None,
        }
    }
}

impl PipelineConfig {
    /// 从 JSON 文件加载配置，缺失的字段使用默认值
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    pub fn with_model_input_shape(mut self, shape: [usize; 4]) -> Self {
        self.model_input_shape = shape;
        self
    }

    pub fn with_color_method(mut self, method: ColorMethod) -> Self {
        self.color_method = method;
        self
    }

    pub fn with_max_detections(mut self, max_detections: Option<usize>) -> Self {
        self.max_detections = max_detections;
        self
    }

    pub fn with_class_names(mut self, class_names: Vec<String>) -> Self {
        self.class_names = class_names;
        self
    }

    pub fn with_detector_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.detector_model_path = Some(path.into());
        self
    }

    pub fn with_color_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.color_model_path = Some(path.into());
        self
    }

    /// 模型输入宽度 (W)
    pub fn input_width(&self) -> usize {
        self.model_input_shape[3]
    }

    /// 模型输入高度 (H)
    pub fn input_height(&self) -> usize {
        self.model_input_shape[2]
    }

    /// 检查阈值与输入形状是否合法
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(TubeError::Config(format!(
                "置信度阈值必须在 [0, 1] 之间, 实际为 {}",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(TubeError::Config(format!(
                "IoU 阈值必须在 [0, 1] 之间, 实际为 {}",
                self.iou_threshold
            )));
        }
        if self.input_width() == 0 || self.input_height() == 0 {
            return Err(TubeError::Config(format!(
                "模型输入尺寸不能为 0: {:?}",
                self.model_input_shape
            )));
        }
        Ok(())
    }
}

/// 从 JSON 文件读取类别名称表
///
/// 文件内容为字符串数组，例如 `["test_tube"]`。
pub fn load_class_names(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    let names: Vec<String> = serde_json::from_str(&text)?;
    if names.is_empty() {
        return Err(TubeError::Config("类别名称表为空".to_string()));
    }
    Ok(names)
}
