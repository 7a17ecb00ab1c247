use thiserror::Error;

/// 统一错误类型
///
/// 只有真正无法恢复的情况才会以错误形式返回，
/// 张量形状异常、单个目标颜色分析失败等都在各模块内部降级处理。
#[derive(Error, Debug)]
pub enum TubeError {
    #[error("模型加载错误: {path}, 错误: {source}")]
    ModelLoad {
        path: String,
        #[source]
        source: ort::Error,
    },
    #[error("推理错误: {0}")]
    Inference(#[from] ort::Error),
    #[error("模型输出无效: {0}")]
    InvalidOutput(String),
    #[error("检测区域为空: {0:?}")]
    EmptyRegion(crate::color::BoundingBox),
    #[error("图像错误: {0}")]
    Image(#[from] image::ImageError),
    #[error("配置错误: {0}")]
    Config(String),
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),
}

impl TubeError {
    pub fn model_load(path: &str, source: ort::Error) -> Self {
        TubeError::ModelLoad {
            path: path.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, TubeError>;
