//! 模型输出解码模块
//!
//! 检测模型的输出张量布局并不固定，可能是 `[batch, values, detections]`，
//! 也可能是 `[batch, detections, values]`。本模块通过比较两个非 batch 维度
//! 推断布局，再按布局读取每个候选框。
//!
//! 推断规则假设较小的维度是每个候选框的数值个数。对于候选框数量
//! 不多于数值通道数的模型，该规则会判断错误，这是已知的限制。

use ndarray::{ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::color::bounds::{BoundingBox, RawDetection};
use crate::config::{MAX_CANDIDATES, MIN_DETECTION_VALUES};

/// 推理引擎输出的原始张量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOutputTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl RawOutputTensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// 输出张量的两种数据排布
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// `[values, detections]`，YOLOv8 默认的导出格式
    ChannelMajor { values: usize, detections: usize },
    /// `[detections, values]`，转置后的格式
    DetectionMajor { detections: usize, values: usize },
}

impl TensorLayout {
    /// 根据形状推断布局
    ///
    /// 只接受 2 维或 3 维形状，3 维时忽略第一个 batch 维度。
    /// 较小的维度被视为每个候选框的数值个数，相等时按检测优先处理。
    pub fn infer(shape: &[usize]) -> Option<Self> {
        let (dim1, dim2) = match *shape {
            [_batch, dim1, dim2] => (dim1, dim2),
            [dim1, dim2] => (dim1, dim2),
            _ => return None,
        };
        if dim1 < dim2 {
            Some(TensorLayout::ChannelMajor {
                values: dim1,
                detections: dim2,
            })
        } else {
            Some(TensorLayout::DetectionMajor {
                detections: dim1,
                values: dim2,
            })
        }
    }

    pub fn values(&self) -> usize {
        match *self {
            TensorLayout::ChannelMajor { values, .. } => values,
            TensorLayout::DetectionMajor { values, .. } => values,
        }
    }

    pub fn detections(&self) -> usize {
        match *self {
            TensorLayout::ChannelMajor { detections, .. } => detections,
            TensorLayout::DetectionMajor { detections, .. } => detections,
        }
    }

    /// 以 `[detections, values]` 的视图访问数据，通道优先布局通过转置视图实现
    fn rows<'a>(&self, data: &'a [f32]) -> Option<ArrayView2<'a, f32>> {
        let len = self.values().checked_mul(self.detections())?;
        let data = data.get(..len)?;
        match *self {
            TensorLayout::ChannelMajor { values, detections } => ArrayView2::from_shape((values, detections), data)
                .ok()
                .map(|view| view.reversed_axes()),
            TensorLayout::DetectionMajor { detections, values } => {
                ArrayView2::from_shape((detections, values), data).ok()
            }
        }
    }
}

/// 解码模型输出张量
///
/// 读取每个候选框的中心坐标与宽高，缩放到原始图像尺寸，转换为左上角坐标并限制在图像内，
/// 最后按置信度阈值过滤。解码不会排序也不会去重。
///
/// # 参数
/// * `tensor` - 模型输出张量
/// * `confidence_threshold` - 置信度阈值，保留 `confidence >= threshold` 的候选框
/// * `original_width` - 原始图像宽度
/// * `original_height` - 原始图像高度
/// * `input_width` - 模型输入宽度
/// * `input_height` - 模型输入高度
/// * `class_names` - 类别名称表
///
/// # 返回值
/// 返回候选检测结果；张量形状异常时返回空列表
pub fn decode(
    tensor: &RawOutputTensor,
    confidence_threshold: f32,
    original_width: f32,
    original_height: f32,
    input_width: usize,
    input_height: usize,
    class_names: &[String],
) -> Vec<RawDetection> {
    let Some(layout) = TensorLayout::infer(tensor.shape()) else {
        error!("模型输出形状不符合预期: {:?}", tensor.shape());
        return Vec::new();
    };
    let values = layout.values();
    if values < MIN_DETECTION_VALUES || input_width == 0 || input_height == 0 {
        error!("模型输出形状不符合预期: {:?}", tensor.shape());
        return Vec::new();
    }
    let Some(rows) = layout.rows(tensor.data()) else {
        error!(
            "模型输出数据长度 {} 小于形状 {:?} 所需",
            tensor.data().len(),
            tensor.shape()
        );
        return Vec::new();
    };
    debug!("解析 {} 个候选框, 每个包含 {} 个值 ({:?})", layout.detections(), values, layout);

    let scale_x = original_width / input_width as f32;
    let scale_y = original_height / input_height as f32;

    let mut detections = Vec::new();
    for row in rows.axis_iter(Axis(0)).take(MAX_CANDIDATES) {
        let (class_id, confidence) = if values == MIN_DETECTION_VALUES {
            (0, row[4])
        } else {
            // 多类别时取索引 4 之后的最大分数
            row.iter()
                .skip(4)
                .copied()
                .enumerate()
                .fold((0, 0.0_f32), |best, (index, score)| {
                    if score > best.1 { (index, score) } else { best }
                })
        };

        if !(confidence >= confidence_threshold) {
            continue;
        }

        let bbox = BoundingBox::from_center(
            row[0] * scale_x,
            row[1] * scale_y,
            row[2] * scale_x,
            row[3] * scale_y,
        )
        .clamp(original_width, original_height);

        let class_name = match class_names.get(class_id) {
            Some(name) => name.clone(),
            None => class_id.to_string(),
        };
        detections.push(RawDetection::new(bbox, confidence, class_id, class_name));
    }

    debug!("置信度阈值 {} 以上的候选框: {}", confidence_threshold, detections.len());
    detections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["test_tube".to_string()]
    }

    /// 候选框数量不足时以零行补齐，避免布局推断把较短的维度当作数值维度
    const MIN_ROWS: usize = 16;

    fn padded(rows: &[Vec<f32>]) -> Vec<Vec<f32>> {
        let mut rows = rows.to_vec();
        let values = rows[0].len();
        while rows.len() < MIN_ROWS {
            rows.push(vec![0.0; values]);
        }
        rows
    }

    /// 构造通道优先的 `[1, values, n]` 张量
    fn channel_major(rows: &[Vec<f32>]) -> RawOutputTensor {
        let rows = padded(rows);
        let values = rows[0].len();
        let n = rows.len();
        let mut data = vec![0.0; values * n];
        for (i, row) in rows.iter().enumerate() {
            for (v, value) in row.iter().enumerate() {
                data[v * n + i] = *value;
            }
        }
        RawOutputTensor::new(vec![1, values, n], data)
    }

    fn detection_major(rows: &[Vec<f32>]) -> RawOutputTensor {
        let rows = padded(rows);
        let values = rows[0].len();
        let data = rows.iter().flatten().copied().collect();
        RawOutputTensor::new(vec![1, rows.len(), values], data)
    }

    #[test]
    fn infer_channel_major() {
        assert_eq!(
            TensorLayout::infer(&[1, 5, 8400]),
            Some(TensorLayout::ChannelMajor {
                values: 5,
                detections: 8400
            })
        );
        assert_eq!(
            TensorLayout::infer(&[84, 8400]),
            Some(TensorLayout::ChannelMajor {
                values: 84,
                detections: 8400
            })
        );
    }

    #[test]
    fn infer_detection_major() {
        assert_eq!(
            TensorLayout::infer(&[1, 8400, 5]),
            Some(TensorLayout::DetectionMajor {
                detections: 8400,
                values: 5
            })
        );
        assert_eq!(
            TensorLayout::infer(&[300, 6]),
            Some(TensorLayout::DetectionMajor {
                detections: 300,
                values: 6
            })
        );
    }

    #[test]
    fn infer_rejects_other_ranks() {
        assert_eq!(TensorLayout::infer(&[8400]), None);
        assert_eq!(TensorLayout::infer(&[1, 1, 5, 8400]), None);
        assert_eq!(TensorLayout::infer(&[]), None);
    }

    #[test]
    fn decode_channel_major_scales_and_converts() {
        // 模型输入 640x640，原图 1280x320
        let tensor = channel_major(&[
            vec![320.0, 320.0, 64.0, 64.0, 0.9],
            vec![100.0, 100.0, 20.0, 20.0, 0.1],
        ]);
        let dets = decode(&tensor, 0.5, 1280.0, 320.0, 640, 640, &names());
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].bbox, BoundingBox::new(576.0, 144.0, 128.0, 32.0));
        assert_eq!(dets[0].confidence, 0.9);
        assert_eq!(dets[0].class_id, 0);
        assert_eq!(dets[0].class_name, "test_tube");
    }

    #[test]
    fn decode_detection_major_matches_channel_major() {
        let rows: Vec<Vec<f32>> = (0..8400)
            .map(|i| {
                let f = i as f32;
                vec![
                    (f * 7.0) % 640.0,
                    (f * 13.0) % 640.0,
                    10.0 + f % 50.0,
                    20.0 + f % 70.0,
                    (i % 100) as f32 / 100.0,
                ]
            })
            .collect();
        let cm = channel_major(&rows);
        let dm = detection_major(&rows);
        assert_eq!(cm.shape(), &[1, 5, 8400]);
        assert_eq!(dm.shape(), &[1, 8400, 5]);

        let a = decode(&cm, 0.5, 1920.0, 1080.0, 640, 640, &names());
        let b = decode(&dm, 0.5, 1920.0, 1080.0, 640, 640, &names());
        assert!(!a.is_empty());
        assert_eq!(a, b);
    }

    #[test]
    fn decode_threshold_is_inclusive_lower_bound() {
        let tensor = detection_major(&[
            vec![50.0, 50.0, 10.0, 10.0, 0.51],
            vec![80.0, 80.0, 10.0, 10.0, 0.49],
            vec![20.0, 20.0, 10.0, 10.0, 0.5],
        ]);
        let dets = decode(&tensor, 0.5, 640.0, 640.0, 640, 640, &names());
        let confidences: Vec<f32> = dets.iter().map(|d| d.confidence).collect();
        assert_eq!(confidences, vec![0.51, 0.5]);
    }

    #[test]
    fn decode_multi_class_takes_max_score() {
        let tensor = detection_major(&[
            vec![50.0, 50.0, 10.0, 10.0, 0.1, 0.7, 0.2],
            vec![80.0, 80.0, 10.0, 10.0, 0.3, 0.2, 0.1],
        ]);
        let class_names = vec!["blue_tube".to_string(), "purple_tube".to_string()];
        let dets = decode(&tensor, 0.5, 640.0, 640.0, 640, 640, &class_names);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].confidence, 0.7);
        assert_eq!(dets[0].class_id, 1);
        assert_eq!(dets[0].class_name, "purple_tube");
    }

    #[test]
    fn decode_unknown_class_id_uses_number() {
        let tensor = detection_major(&[vec![50.0, 50.0, 10.0, 10.0, 0.0, 0.0, 0.9]]);
        let dets = decode(&tensor, 0.5, 640.0, 640.0, 640, 640, &names());
        assert_eq!(dets[0].class_name, "2");
    }

    #[test]
    fn decode_clamps_boxes_to_image() {
        let tensor = detection_major(&[vec![2.0, 630.0, 20.0, 40.0, 0.8]]);
        let dets = decode(&tensor, 0.5, 640.0, 640.0, 640, 640, &names());
        assert_eq!(dets[0].bbox, BoundingBox::new(0.0, 600.0, 20.0, 40.0));
    }

    #[test]
    fn decode_malformed_shapes_yield_nothing() {
        let data = vec![0.9; 40];
        let bad = [
            RawOutputTensor::new(vec![40], data.clone()),
            RawOutputTensor::new(vec![1, 1, 4, 10], data.clone()),
            // 每个候选框少于 5 个值
            RawOutputTensor::new(vec![1, 4, 10], data.clone()),
            // 数据长度不足
            RawOutputTensor::new(vec![1, 5, 100], data.clone()),
            // 元素个数溢出 usize
            RawOutputTensor::new(vec![1, 6, usize::MAX], data.clone()),
        ];
        for tensor in &bad {
            assert!(decode(tensor, 0.5, 640.0, 640.0, 640, 640, &names()).is_empty());
        }
    }

    #[test]
    fn decode_caps_candidate_count() {
        let n = MAX_CANDIDATES + 100;
        let rows: Vec<Vec<f32>> = (0..n).map(|_| vec![50.0, 50.0, 10.0, 10.0, 0.9]).collect();
        let dets = decode(&detection_major(&rows), 0.5, 640.0, 640.0, 640, 640, &names());
        assert_eq!(dets.len(), MAX_CANDIDATES);
    }

    #[test]
    fn decode_ignores_nan_confidence() {
        let tensor = detection_major(&[vec![50.0, 50.0, 10.0, 10.0, f32::NAN]]);
        assert!(decode(&tensor, 0.5, 640.0, 640.0, 640, 640, &names()).is_empty());
    }
}
