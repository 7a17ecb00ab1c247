//! 非极大值抑制 (NMS)
//!
//! 按置信度从高到低保留检测框，并抑制与已保留框重叠过多的后续框。

use tracing::debug;

use crate::color::bounds::RawDetection;

/// 计算 NMS 后保留的检测在输入中的下标
///
/// 按置信度降序遍历，置信度相同时按原始下标升序，结果与输入顺序无关（并列情况除外）。
/// 与已保留框的 IoU 严格大于 `iou_threshold` 的框会被抑制。
///
/// # 参数
/// * `detections` - 检测结果列表
/// * `iou_threshold` - IoU 阈值
/// * `max_detections` - 最多保留的数量
///
/// # 返回值
/// 返回按置信度降序排列的保留下标
pub fn keep_indices(
    detections: &[RawDetection],
    iou_threshold: f32,
    max_detections: Option<usize>,
) -> Vec<usize> {
    let mut order: Vec<usize> = (0..detections.len()).collect();
    // 稳定排序，并列时保持原始顺序
    order.sort_by(|&a, &b| {
        detections[b]
            .confidence
            .total_cmp(&detections[a].confidence)
    });

    let mut suppressed = vec![false; order.len()];
    let mut keep = Vec::new();

    for i in 0..order.len() {
        if suppressed[i] {
            continue;
        }
        let current = &detections[order[i]];
        keep.push(order[i]);
        debug!("保留检测 {} (置信度 {:.3})", order[i], current.confidence);

        for j in (i + 1)..order.len() {
            if suppressed[j] {
                continue;
            }
            let iou = current.bbox.iou(&detections[order[j]].bbox);
            if iou > iou_threshold {
                suppressed[j] = true;
                debug!(
                    "抑制检测 {} (IoU: {:.3} > {})",
                    order[j], iou, iou_threshold
                );
            }
        }
    }

    if let Some(max) = max_detections {
        keep.truncate(max);
    }
    debug!("NMS 结果: 保留 {} / {} 个检测", keep.len(), detections.len());
    keep
}

/// 应用非极大值抑制
///
/// 去除重叠度高的重复检测框，只保留置信度最高的框。
/// 输出总是输入的子集。
pub fn suppress(
    detections: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: Option<usize>,
) -> Vec<RawDetection> {
    if detections.is_empty() {
        return detections;
    }
    let keep = keep_indices(&detections, iou_threshold, max_detections);
    let mut slots: Vec<Option<RawDetection>> = detections.into_iter().map(Some).collect();
    keep.into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}
