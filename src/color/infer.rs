use ndarray::Array4;
use ort::{inputs, session::Session, value::Tensor};
use tracing::debug;

use crate::color::tensor::RawOutputTensor;
use crate::error::{Result, TubeError};

/// 运行模型推理
///
/// 将四维输入张量送入模型的第一个输入，返回第一个输出的原始数据与形状。
///
/// # 参数
/// * `model` - ONNX模型Session
/// * `input` - 输入张量
///
/// # 返回值
/// 返回模型输出张量
///
/// # 错误处理
/// 推理失败时返回 `TubeError::Inference`，输出不是 f32 张量或维度为负时返回 `TubeError::InvalidOutput`
pub fn run_inference(model: &mut Session, input: &Array4<f32>) -> Result<RawOutputTensor> {
    let shape: Vec<usize> = input.shape().to_vec();
    let (data, _offset) = input.as_standard_layout().into_owned().into_raw_vec_and_offset();
    let input_tensor = Tensor::from_array(([shape[0], shape[1], shape[2], shape[3]], data))?;
    let outputs = model.run(inputs![input_tensor])?;

    let output = outputs[0].try_extract_tensor::<f32>()?;
    let dims = output
        .0
        .iter()
        .map(|&dim| usize::try_from(dim))
        .collect::<std::result::Result<Vec<usize>, _>>()
        .map_err(|_| TubeError::InvalidOutput(format!("输出维度无效: {:?}", output.0)))?;
    debug!("模型输出形状: {:?}", dims);

    Ok(RawOutputTensor::new(dims, output.1.to_vec()))
}
