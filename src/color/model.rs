use ort::session::{Session, builder::GraphOptimizationLevel};
use std::path::Path;
use tracing::info;

use crate::config::SESSION_INTRA_THREADS;
use crate::error::{Result, TubeError};

/// 加载ONNX模型
///
/// 检测模型和颜色分类网络都通过此函数加载，并应用相同的优化配置。
///
/// # 参数
/// * `model_path` - 模型文件路径
///
/// # 返回值
/// 返回加载的Session对象
///
/// # 错误处理
/// 文件不存在时返回 `TubeError::Io`（`NotFound`），模型无法加载时返回 `TubeError::ModelLoad`
pub fn load_model(model_path: impl AsRef<Path>) -> Result<Session> {
    let model_path = model_path.as_ref();
    let path_display = model_path.display().to_string();
    if !model_path.exists() {
        return Err(TubeError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("模型文件不存在: {}", path_display),
        )));
    }

    info!("加载模型文件: {}", path_display);
    let model = build_session(model_path).map_err(|e| TubeError::model_load(&path_display, e))?;
    info!("模型加载完成");
    Ok(model)
}

fn build_session(model_path: &Path) -> std::result::Result<Session, ort::Error> {
    let model = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(SESSION_INTRA_THREADS)?
        .commit_from_file(model_path)?;
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_is_io_error() {
        let result = load_model("does/not/exist.onnx");
        assert!(matches!(result, Err(TubeError::Io(_))));
    }
}
