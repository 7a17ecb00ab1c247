pub mod color;
pub mod config;
pub mod error;

// 重新导出color模块中的常用类型和函数
pub use color::{AnnotatedDetection, BoundingBox, DetectionPipeline, RawDetection, RawOutputTensor};
pub use color::{ColorClassifier, ColorLabel, ColorMethod, ColorResult};
pub use color::{CnnColorClassifier, HsvColorClassifier};
pub use color::{TubeDetector, draw_detections};
pub use color::{load_image, load_model};
pub use config::{PipelineConfig, load_class_names};
pub use error::{Result, TubeError};
