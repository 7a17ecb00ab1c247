use std::collections::BTreeMap;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::color::bounds::BoundingBox;
use crate::config::FALLBACK_COLOR_CONFIDENCE;
use crate::error::Result;

/// 颜色标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorLabel {
    Blue,
    Purple,
    Other,
    Unknown,
}

/// 颜色的展示信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorDisplay {
    pub name: &'static str,
    pub hex: &'static str,
    pub emoji: &'static str,
}

impl ColorLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorLabel::Blue => "blue",
            ColorLabel::Purple => "purple",
            ColorLabel::Other => "other",
            ColorLabel::Unknown => "unknown",
        }
    }

    pub fn display(&self) -> ColorDisplay {
        match self {
            ColorLabel::Blue => ColorDisplay {
                name: "Blue",
                hex: "#0066CC",
                emoji: "🔵",
            },
            ColorLabel::Purple => ColorDisplay {
                name: "Purple",
                hex: "#9933CC",
                emoji: "🟣",
            },
            ColorLabel::Other => ColorDisplay {
                name: "Other",
                hex: "#666666",
                emoji: "⚫",
            },
            ColorLabel::Unknown => ColorDisplay {
                name: "Unknown",
                hex: "#999999",
                emoji: "❓",
            },
        }
    }
}

/// 颜色分类方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorMethod {
    /// 基于 HSV 色彩范围的规则投票
    #[default]
    #[serde(rename = "HSV", alias = "hsv")]
    Hsv,
    /// 卷积神经网络分类
    #[serde(rename = "CNN", alias = "cnn")]
    Cnn,
}

/// 单个检测区域的颜色分类结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorResult {
    pub label: ColorLabel,
    /// 0-100 的置信度百分比
    pub confidence: u8,
    /// 各类别的计票或得分，含义取决于分类方法
    pub votes: BTreeMap<String, u32>,
}

impl ColorResult {
    pub fn new(label: ColorLabel, confidence: u8, votes: BTreeMap<String, u32>) -> Self {
        Self {
            label,
            confidence: confidence.min(100),
            votes,
        }
    }

    /// 颜色分析失败时使用的默认结果
    pub fn fallback() -> Self {
        Self::new(ColorLabel::Blue, FALLBACK_COLOR_CONFIDENCE, BTreeMap::new())
    }
}

/// 颜色分类策略
///
/// 实现者对给定图像中边界框所在区域给出颜色标签。
pub trait ColorClassifier {
    fn method(&self) -> ColorMethod;

    fn classify(&mut self, image: &RgbaImage, bbox: &BoundingBox) -> Result<ColorResult>;
}
