use std::time::Instant;

use image::{DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::session::Session;
use rand::Rng;
use raqote::{DrawOptions, DrawTarget, LineJoin, PathBuilder, SolidSource, Source, StrokeStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::color::bounds::{BoundingBox, RawDetection};
use crate::color::classifier::ColorMethod;
use crate::color::image::{image_to_tensor, resize_image};
use crate::color::infer::run_inference;
use crate::color::model::load_model;
use crate::color::pipeline::{AnnotatedDetection, DetectionPipeline};
use crate::config::{DEMO_CLASS_LABEL, PipelineConfig};
use crate::error::{Result, TubeError};

/// 试管检测器
///
/// 封装了完整的检测流程，包括图像预处理、模型推理、后处理和颜色分类。
/// 检测模型无法加载时进入演示模式，返回随机生成的模拟检测，调用方无需区别处理。
///
/// # 示例
///
/// ```no_run
/// use tubehue::{PipelineConfig, TubeDetector, load_image};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PipelineConfig::default().with_detector_model_path("models/best.onnx");
/// let mut detector = TubeDetector::load(config)?;
/// let image = load_image("path/to/image.jpg")?;
/// let detections = detector.detect(&image)?;
/// # Ok(())
/// # }
/// ```
pub struct TubeDetector {
    /// 检测模型会话，为 None 时处于演示模式
    session: Option<Session>,
    pipeline: DetectionPipeline,
}

/// 检测器当前参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub input_shape: [usize; 4],
    pub class_names: Vec<String>,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: Option<usize>,
    pub color_method: ColorMethod,
    pub demo_mode: bool,
}

impl TubeDetector {
    /// 使用已有的会话和流水线创建检测器
    ///
    /// # 参数
    /// * `session` - 检测模型会话，传入 None 则进入演示模式
    /// * `pipeline` - 后处理与颜色分类流水线
    pub fn new(session: Option<Session>, pipeline: DetectionPipeline) -> Self {
        Self { session, pipeline }
    }

    /// 按配置加载检测模型和颜色分类器
    ///
    /// # 参数
    /// * `config` - 流水线配置
    ///
    /// # 返回值
    /// 返回检测器。检测模型缺失或加载失败时不会报错，而是进入演示模式
    ///
    /// # 错误处理
    /// 仅在配置不合法时返回 `TubeError::Config`
    pub fn load(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let session = match config.detector_model_path.as_deref() {
            Some(path) => match load_model(path) {
                Ok(session) => Some(session),
                Err(e) => {
                    warn!("检测模型加载失败: {}, 进入演示模式", e);
                    None
                }
            },
            None => {
                warn!("未配置检测模型, 进入演示模式");
                None
            }
        };
        let pipeline = DetectionPipeline::from_config(config)?;
        Ok(Self::new(session, pipeline))
    }

    pub fn is_demo_mode(&self) -> bool {
        self.session.is_none()
    }

    pub fn pipeline(&self) -> &DetectionPipeline {
        &self.pipeline
    }

    /// 将图像缩放到模型输入尺寸并转换为 NCHW 张量
    pub fn preprocess(&self, image: &DynamicImage) -> Array4<f32> {
        model_input(image, self.pipeline.config())
    }

    /// 完整的检测流程：从图像到带颜色的检测结果
    ///
    /// # 参数
    /// * `image` - 待检测的图像
    ///
    /// # 返回值
    /// 返回检测结果列表，图像尺寸为 0 时返回空列表
    ///
    /// # 错误处理
    /// 推理失败时返回 `TubeError::Inference`
    pub fn detect(&mut self, image: &DynamicImage) -> Result<Vec<AnnotatedDetection>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            warn!("图像尺寸无效: {}x{}", width, height);
            return Ok(Vec::new());
        }
        let rgba = image.to_rgba8();

        let Some(session) = self.session.as_mut() else {
            info!("演示模式: 生成模拟检测结果");
            let detections = demo_detections(width as f32, height as f32);
            return Ok(self.pipeline.annotate(detections, &rgba));
        };

        let input = model_input(image, self.pipeline.config());
        let start_time = Instant::now();
        let output = run_inference(session, &input)?;
        debug!("模型推理耗时: {:?}", start_time.elapsed());

        let detections = self.pipeline.run(&output, &rgba);
        info!("检测到 {} 个试管", detections.len());
        Ok(detections)
    }

    /// 用一张全黑图像运行一次检测，失败只记录日志
    pub fn warm_up(&mut self) {
        let width = self.pipeline.config().input_width() as u32;
        let height = self.pipeline.config().input_height() as u32;
        let blank = DynamicImage::new_rgb8(width, height);
        match self.detect(&blank) {
            Ok(_) => info!("模型预热完成"),
            Err(e) => warn!("模型预热失败: {}", e),
        }
    }

    /// 更新置信度与 IoU 阈值，非法值返回 `TubeError::Config` 且不做修改
    pub fn set_thresholds(&mut self, confidence_threshold: f32, iou_threshold: f32) -> Result<()> {
        self.pipeline.set_thresholds(confidence_threshold, iou_threshold)
    }

    pub fn model_info(&self) -> ModelInfo {
        let config = self.pipeline.config();
        ModelInfo {
            input_shape: config.model_input_shape,
            class_names: config.class_names.clone(),
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
            color_method: self.pipeline.method(),
            demo_mode: self.is_demo_mode(),
        }
    }
}

fn model_input(image: &DynamicImage, config: &PipelineConfig) -> Array4<f32> {
    let width = config.input_width();
    let height = config.input_height();
    let resized = resize_image(image, width as u32, height as u32);
    image_to_tensor(&resized, height, width)
}

/// 生成 1 到 3 个模拟检测
///
/// 框的左上角落在图像左上 60% 的范围内，宽 50~150，高 100~250，
/// 置信度 0.6~1.0，并裁剪到图像范围内。
pub fn demo_detections(image_width: f32, image_height: f32) -> Vec<RawDetection> {
    let mut rng = rand::rng();
    let count = rng.random_range(1..=3);
    (0..count)
        .map(|_| {
            let x = rng.random::<f32>() * image_width * 0.6;
            let y = rng.random::<f32>() * image_height * 0.6;
            let width = rng.random_range(50.0..150.0);
            let height = rng.random_range(100.0..250.0);
            let bbox = BoundingBox::new(x, y, width, height).clamp(image_width, image_height);
            RawDetection::new(
                bbox,
                rng.random_range(0.6..1.0),
                0,
                DEMO_CLASS_LABEL.to_string(),
            )
        })
        .collect()
}

fn hex_to_source(hex: &str) -> SolidSource {
    let channel = |range: std::ops::Range<usize>| {
        hex.get(range)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .unwrap_or(0x99)
    };
    SolidSource {
        r: channel(1..3),
        g: channel(3..5),
        b: channel(5..7),
        a: 0xFF,
    }
}

/// 在图像上绘制检测结果
///
/// 每个检测框使用其颜色分类结果对应的显示颜色。
///
/// # 参数
/// * `image` - 原始图像
/// * `detections` - 检测结果列表
///
/// # 返回值
/// 返回绘制了检测框的图像
pub fn draw_detections(image: &DynamicImage, detections: &[AnnotatedDetection]) -> Result<DynamicImage> {
    let (img_width, img_height) = image.dimensions();
    let mut dt = DrawTarget::new(img_width as i32, img_height as i32);

    let rgba_image = image.to_rgba8();
    let image_data: Vec<u32> = rgba_image
        .pixels()
        .map(|pixel| {
            let [r, g, b, a] = pixel.0;
            u32::from_le_bytes([b, g, r, a])
        })
        .collect();

    let img = raqote::Image {
        width: img_width as i32,
        height: img_height as i32,
        data: &image_data,
    };
    dt.draw_image_at(0.0, 0.0, &img, &DrawOptions::new());

    for detection in detections {
        let bbox = &detection.bbox;
        let mut pb = PathBuilder::new();
        pb.rect(bbox.x, bbox.y, bbox.width, bbox.height);
        let path = pb.finish();

        dt.stroke(
            &path,
            &Source::Solid(hex_to_source(&detection.color.display_color)),
            &StrokeStyle {
                join: LineJoin::Round,
                width: 2.0,
                ..StrokeStyle::default()
            },
            &DrawOptions::default(),
        );
    }

    // BGRA to RGBA
    let pixels: Vec<u8> = dt
        .get_data()
        .iter()
        .flat_map(|&pixel| {
            let bytes = pixel.to_le_bytes();
            [bytes[2], bytes[1], bytes[0], bytes[3]]
        })
        .collect();

    image::RgbaImage::from_raw(img_width, img_height, pixels)
        .map(DynamicImage::ImageRgba8)
        .ok_or_else(|| TubeError::InvalidOutput("绘制结果与图像尺寸不一致".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::classifier::{ColorLabel, ColorResult};
    use crate::color::pipeline::ColorAnnotation;
    use image::Rgba;

    fn demo_detector() -> TubeDetector {
        let config = PipelineConfig::default().with_detector_model_path("models/missing_detector.onnx");
        TubeDetector::load(config).unwrap()
    }

    #[test]
    fn missing_model_enters_demo_mode() {
        let detector = demo_detector();
        assert!(detector.is_demo_mode());
        assert!(TubeDetector::load(PipelineConfig::default()).unwrap().is_demo_mode());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = PipelineConfig::default().with_iou_threshold(-0.1);
        assert!(matches!(TubeDetector::load(config), Err(TubeError::Config(_))));
    }

    #[test]
    fn demo_detections_stay_in_frame() {
        for _ in 0..50 {
            let detections = demo_detections(320.0, 240.0);
            assert!((1..=3).contains(&detections.len()));
            for det in &detections {
                assert_eq!(det.class_name, DEMO_CLASS_LABEL);
                assert_eq!(det.class_id, 0);
                assert!((0.6..=1.0).contains(&det.confidence));
                assert!(det.bbox.x >= 0.0 && det.bbox.right() <= 320.0);
                assert!(det.bbox.y >= 0.0 && det.bbox.bottom() <= 240.0);
            }
        }
    }

    #[test]
    fn demo_detect_classifies_colors() {
        let mut detector = demo_detector();
        let image = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            400,
            400,
            Rgba([0x00, 0x66, 0xCC, 0xFF]),
        ));
        let detections = detector.detect(&image).unwrap();
        assert!(!detections.is_empty());
        for det in &detections {
            assert_eq!(det.color.label, ColorLabel::Blue);
            assert_eq!(det.color.method, ColorMethod::Hsv);
        }
    }

    #[test]
    fn zero_sized_image_gives_no_detections() {
        let mut detector = demo_detector();
        let image = DynamicImage::new_rgb8(0, 0);
        assert!(detector.detect(&image).unwrap().is_empty());
    }

    #[test]
    fn preprocess_uses_model_input_shape() {
        let config = PipelineConfig::default().with_model_input_shape([1, 3, 32, 48]);
        let detector = TubeDetector::load(config).unwrap();
        let tensor = detector.preprocess(&DynamicImage::new_rgb8(100, 60));
        assert_eq!(tensor.shape(), &[1, 3, 32, 48]);
    }

    #[test]
    fn model_info_reflects_thresholds() {
        let mut detector = demo_detector();
        detector.warm_up();
        detector.set_thresholds(0.25, 0.45).unwrap();
        let info = detector.model_info();
        assert_eq!(info.confidence_threshold, 0.25);
        assert_eq!(info.iou_threshold, 0.45);
        assert_eq!(info.input_shape, [1, 3, 640, 640]);
        assert!(info.demo_mode);

        let value = serde_json::to_value(&info).unwrap();

        assert!(detector.set_thresholds(f32::NAN, 0.45).is_err());
        assert_eq!(detector.model_info().confidence_threshold, 0.25);
        assert_eq!(value["iouThreshold"], serde_json::json!(0.45f32));
        assert_eq!(value["classNames"], serde_json::json!(["test_tube"]));
    }

    #[test]
    fn draws_box_in_display_color() {
        let image = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            100,
            100,
            Rgba([0xFF, 0xFF, 0xFF, 0xFF]),
        ));
        let result = ColorResult::new(ColorLabel::Purple, 80, Default::default());
        let detection = AnnotatedDetection::new(
            RawDetection::new(BoundingBox::new(10.0, 10.0, 50.0, 50.0), 0.9, 0, "test_tube".to_string()),
            ColorAnnotation::new(result, ColorMethod::Hsv, false),
        );
        let drawn = draw_detections(&image, &[detection]).unwrap().to_rgba8();
        assert_eq!(drawn.dimensions(), (100, 100));
        assert_ne!(*drawn.get_pixel(10, 30), Rgba([0xFF, 0xFF, 0xFF, 0xFF]));
        assert_eq!(*drawn.get_pixel(35, 35), Rgba([0xFF, 0xFF, 0xFF, 0xFF]));
    }

    #[test]
    fn parses_display_hex() {
        let source = hex_to_source("#9933CC");
        assert_eq!((source.r, source.g, source.b), (0x99, 0x33, 0xCC));
    }
}
