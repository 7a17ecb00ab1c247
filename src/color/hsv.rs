//! HSV 颜色分析
//!
//! 只采样检测框中心 40%×40% 的区域以避开试管边缘和背景，
//! 将像素转换到 HSV 空间后按色彩范围表投票。
//! 结果只会是蓝色或紫色两种之一。

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use image::{Rgba, RgbaImage};
use tracing::debug;

use crate::color::bounds::BoundingBox;
use crate::color::classifier::{ColorClassifier, ColorLabel, ColorMethod, ColorResult};
use crate::color::image::{PixelRegion, sample_pixels};
use crate::config::{
    ALPHA_THRESHOLD, CENTER_OFFSET_RATIO, CENTER_SIZE_RATIO, FALLBACK_COLOR_CONFIDENCE,
    MAX_COLOR_SAMPLES, MIN_COLOR_CONFIDENCE,
};
use crate::error::Result;

/// HSV 颜色，色相为 0-360 度，饱和度和明度为 0-100 的百分比
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsv {
    pub h: u16,
    pub s: u8,
    pub v: u8,
}

/// 四舍五入，.5 一律向正无穷方向进位（负数同样如此）
fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

/// RGB 转 HSV
///
/// 以 f64 计算，色相、饱和度、明度均按 [`round_half_up`] 取整，
/// 落在 .5 边界上的像素因此会进位到较大的值。
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> Hsv {
    let r = r as f64 / 255.0;
    let g = g as f64 / 255.0;
    let b = b as f64 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = max - min;

    let mut h = 0.0;
    if diff != 0.0 {
        h = if max == r {
            ((g - b) / diff) % 6.0
        } else if max == g {
            (b - r) / diff + 2.0
        } else {
            (r - g) / diff + 4.0
        };
    }
    let mut h = round_half_up(h * 60.0);
    if h < 0.0 {
        h += 360.0;
    }

    let s = if max == 0.0 { 0.0 } else { round_half_up(diff / max * 100.0) };
    let v = round_half_up(max * 100.0);

    Hsv {
        h: h as u16,
        s: s as u8,
        v: v as u8,
    }
}

/// 颜色投票桶
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColorBucket {
    Blue,
    LightBlue,
    Purple,
    DarkPurple,
    Other,
}

impl ColorBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorBucket::Blue => "blue",
            ColorBucket::LightBlue => "lightBlue",
            ColorBucket::Purple => "purple",
            ColorBucket::DarkPurple => "darkPurple",
            ColorBucket::Other => "other",
        }
    }
}

struct HsvRange {
    bucket: ColorBucket,
    h: RangeInclusive<u16>,
    s: RangeInclusive<u8>,
    v: RangeInclusive<u8>,
}

// 按顺序匹配，先命中者优先
const HSV_RANGES: [HsvRange; 4] = [
    HsvRange {
        bucket: ColorBucket::Blue,
        h: 190..=250,
        s: 25..=100,
        v: 25..=100,
    },
    HsvRange {
        bucket: ColorBucket::LightBlue,
        h: 170..=210,
        s: 15..=70,
        v: 35..=100,
    },
    HsvRange {
        bucket: ColorBucket::Purple,
        h: 260..=320,
        s: 25..=100,
        v: 20..=100,
    },
    HsvRange {
        bucket: ColorBucket::DarkPurple,
        h: 240..=280,
        s: 20..=100,
        v: 15..=90,
    },
];

/// 按色彩范围表对单个 HSV 像素分类
pub fn classify_hsv(hsv: Hsv) -> ColorBucket {
    HSV_RANGES
        .iter()
        .find(|range| range.h.contains(&hsv.h) && range.s.contains(&hsv.s) && range.v.contains(&hsv.v))
        .map(|range| range.bucket)
        .unwrap_or(ColorBucket::Other)
}

/// 各颜色桶的计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColorCounts {
    pub blue: u32,
    pub light_blue: u32,
    pub purple: u32,
    pub dark_purple: u32,
    pub other: u32,
}

impl ColorCounts {
    pub fn add(&mut self, bucket: ColorBucket) {
        match bucket {
            ColorBucket::Blue => self.blue += 1,
            ColorBucket::LightBlue => self.light_blue += 1,
            ColorBucket::Purple => self.purple += 1,
            ColorBucket::DarkPurple => self.dark_purple += 1,
            ColorBucket::Other => self.other += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.blue + self.light_blue + self.purple + self.dark_purple + self.other
    }

    pub fn total_blue(&self) -> u32 {
        self.blue + self.light_blue
    }

    pub fn total_purple(&self) -> u32 {
        self.purple + self.dark_purple
    }

    /// 蓝色合计不少于紫色合计时为蓝色
    pub fn dominant(&self) -> ColorLabel {
        if self.total_blue() >= self.total_purple() {
            ColorLabel::Blue
        } else {
            ColorLabel::Purple
        }
    }

    /// 主色所占百分比，最低 30，无有效像素时为 50
    pub fn confidence(&self, dominant: ColorLabel) -> u8 {
        let total = self.total();
        if total == 0 {
            return FALLBACK_COLOR_CONFIDENCE;
        }
        let dominant_count = match dominant {
            ColorLabel::Blue => self.total_blue(),
            ColorLabel::Purple => self.total_purple(),
            _ => 0,
        };
        let percent = (dominant_count as f64 / total as f64 * 100.0).round() as u8;
        percent.max(MIN_COLOR_CONFIDENCE).min(100)
    }

    fn to_votes(self) -> BTreeMap<String, u32> {
        [
            (ColorBucket::Blue, self.blue),
            (ColorBucket::LightBlue, self.light_blue),
            (ColorBucket::Purple, self.purple),
            (ColorBucket::DarkPurple, self.dark_purple),
            (ColorBucket::Other, self.other),
        ]
        .into_iter()
        .map(|(bucket, count)| (bucket.as_str().to_string(), count))
        .collect()
    }
}

/// 对采样像素计票，跳过半透明像素
pub fn tally(pixels: &[Rgba<u8>]) -> ColorCounts {
    let mut counts = ColorCounts::default();
    for pixel in pixels {
        let [r, g, b, a] = pixel.0;
        if a < ALPHA_THRESHOLD {
            continue;
        }
        counts.add(classify_hsv(rgb_to_hsv(r, g, b)));
    }
    counts
}

/// 基于 HSV 范围的颜色分类器，无状态
#[derive(Debug, Clone, Copy, Default)]
pub struct HsvColorClassifier;

impl HsvColorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// 分析检测框区域的主色
    ///
    /// # 参数
    /// * `image` - 原始图像的 RGBA 像素缓冲
    /// * `bbox` - 检测框
    ///
    /// # 返回值
    /// 返回蓝色或紫色及其置信度
    pub fn analyze(&self, image: &RgbaImage, bbox: &BoundingBox) -> ColorResult {
        let region = PixelRegion::from_bbox(bbox, image.width(), image.height())
            .center(CENTER_OFFSET_RATIO, CENTER_SIZE_RATIO);
        let pixels = sample_pixels(image, region, MAX_COLOR_SAMPLES);
        let counts = tally(&pixels);
        debug!(
            "颜色分析区域 {}x{}, 采样 {} 个像素: {:?}",
            region.width,
            region.height,
            pixels.len(),
            counts
        );

        let label = counts.dominant();
        ColorResult::new(label, counts.confidence(label), counts.to_votes())
    }
}

impl ColorClassifier for HsvColorClassifier {
    fn method(&self) -> ColorMethod {
        ColorMethod::Hsv
    }

    fn classify(&mut self, image: &RgbaImage, bbox: &BoundingBox) -> Result<ColorResult> {
        Ok(self.analyze(image, bbox))
    }
}
