//! Color模块 - 试管检测的后处理与颜色分类
//!
//! 该模块接收 YOLO 风格检测模型的原始输出，完成：
//! - 输出张量布局识别与解码
//! - 置信度过滤与非极大值抑制
//! - 基于 HSV 统计或 CNN 的试管颜色分类
//! - 可视化绘制
//!
//! # 主要组件
//!
//! - DetectionPipeline：单帧后处理流水线，颜色分类器由外部注入
//! - TubeDetector：封装检测模型推理，模型缺失时进入演示模式
//! - HsvColorClassifier / CnnColorClassifier：两种颜色分类实现
//! - draw_detections：在图像上绘制检测结果
//!
//! # 工作流程
//!
//! 1. 使用 PipelineConfig 配置阈值、输入尺寸和颜色分类方法
//! 2. 创建 TubeDetector（或直接使用 DetectionPipeline 处理已有的模型输出）
//! 3. 调用 detect 方法执行检测
//! 4. 使用 draw_detections 绘制检测结果
//!
//! # 示例
//!
//! ```
//! use image::{Rgba, RgbaImage};
//! use tubehue::{DetectionPipeline, PipelineConfig, RawOutputTensor};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::default().with_model_input_shape([1, 3, 100, 100]);
//! let mut pipeline = DetectionPipeline::from_config(config)?;
//!
//! let image = RgbaImage::from_pixel(100, 100, Rgba([0x00, 0x66, 0xCC, 0xFF]));
//! // 检测优先布局 [1, 8, 5]，只有第一个候选框的置信度非零
//! let mut data = vec![0.0; 8 * 5];
//! data[..5].copy_from_slice(&[50.0, 50.0, 20.0, 40.0, 0.9]);
//! let tensor = RawOutputTensor::new(vec![1, 8, 5], data);
//! let detections = pipeline.run(&tensor, &image);
//! assert_eq!(detections.len(), 1);
//! assert_eq!(detections[0].color.name, "Blue");
//! # Ok(())
//! # }
//! ```

pub mod bounds;
pub mod classifier;
pub mod cnn;
pub mod detect;
pub mod hsv;
pub mod image;
pub mod infer;
pub mod model;
pub mod nms;
pub mod pipeline;
pub mod tensor;

// 重新导出常用类型和函数
pub use bounds::{BoundingBox, RawDetection};
pub use classifier::{ColorClassifier, ColorDisplay, ColorLabel, ColorMethod, ColorResult};
pub use cnn::CnnColorClassifier;
pub use detect::{ModelInfo, TubeDetector, draw_detections};
pub use hsv::HsvColorClassifier;
pub use self::image::{image_to_tensor, load_image, resize_image};
pub use model::load_model;
pub use nms::suppress;
pub use pipeline::{AnnotatedDetection, ColorAnnotation, DetectionPipeline};
pub use tensor::{RawOutputTensor, TensorLayout, decode};
