use serde::{Deserialize, Serialize};

/// 边界框结构
///
/// 以左上角坐标加宽高表示，单位为原始图像像素。
/// 序列化为 `[x, y, width, height]` 数组。
#[derive(Debug, Clone, Default, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    /// 左上角x坐标
    pub x: f32,
    /// 左上角y坐标
    pub y: f32,
    /// 宽度
    pub width: f32,
    /// 高度
    pub height: f32,
}

impl BoundingBox {
    /// 创建一个新的边界框
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// 由中心点坐标和宽高创建边界框
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// 计算边界框的面积
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// 检查边界框是否有效（宽度和高度都大于0）
    pub fn is_valid(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// 将边界框限制在图像范围内
    ///
    /// 优先平移框的位置，只有在框比图像还大时才缩小宽高，
    /// 因此框的面积只会因越界部分而改变。多次调用结果不变。
    ///
    /// # 参数
    /// * `image_width` - 图像宽度
    /// * `image_height` - 图像高度
    ///
    /// # 返回值
    /// 返回满足 `x + width <= image_width`、`y + height <= image_height` 的边界框
    pub fn clamp(&self, image_width: f32, image_height: f32) -> Self {
        let width = self.width.max(0.0);
        let height = self.height.max(0.0);
        let x = self.x.min(image_width - width).max(0.0);
        let y = self.y.min(image_height - height).max(0.0);
        Self {
            x,
            y,
            width: width.min(image_width - x),
            height: height.min(image_height - y),
        }
    }

    /// 计算两个边界框的交集面积
    pub fn intersection(&self, other: &BoundingBox) -> f32 {
        let x_left = self.x.max(other.x);
        let y_top = self.y.max(other.y);
        let x_right = self.right().min(other.right());
        let y_bottom = self.bottom().min(other.bottom());

        if x_right <= x_left || y_bottom <= y_top {
            0.0
        } else {
            (x_right - x_left) * (y_bottom - y_top)
        }
    }

    /// 计算两个边界框的交并比 (IoU)
    ///
    /// 不相交或并集面积为 0 时返回 0。
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = self.intersection(other);
        if inter == 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union > 0.0 { inter / union } else { 0.0 }
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from([x, y, width, height]: [f32; 4]) -> Self {
        Self { x, y, width, height }
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(bbox: BoundingBox) -> Self {
        [bbox.x, bbox.y, bbox.width, bbox.height]
    }
}

/// 检测结果结构
///
/// 由张量解码得到，之后不再修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// 目标的边界框
    pub bbox: BoundingBox,
    /// 置信度
    pub confidence: f32,
    /// 类别ID
    pub class_id: usize,
    /// 类别名称
    pub class_name: String,
}

impl RawDetection {
    /// 创建一个新的检测结果，置信度会被限制在 [0, 1]
    pub fn new(bbox: BoundingBox, confidence: f32, class_id: usize, class_name: String) -> Self {
        Self {
            bbox,
            confidence: confidence.clamp(0.0, 1.0),
            class_id,
            class_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 5.0, 5.0);
        assert_eq!(a.iou(&b), 0.0);
        // 仅边相接
        let c = BoundingBox::new(10.0, 0.0, 10.0, 10.0);
        assert_eq!(a.iou(&c), 0.0);
    }

    #[test]
    fn iou_standard_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(0.0, 0.0, 10.0, 9.0);
        assert!((a.iou(&b) - 0.9).abs() < 1e-6);
        assert!((b.iou(&a) - 0.9).abs() < 1e-6);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_with_zero_area_box() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let flat = BoundingBox::new(2.0, 2.0, 0.0, 5.0);
        assert_eq!(a.iou(&flat), 0.0);
    }

    #[test]
    fn clamp_shifts_box_back_inside() {
        let bbox = BoundingBox::new(-5.0, 95.0, 20.0, 10.0).clamp(100.0, 100.0);
        assert_eq!(bbox, BoundingBox::new(0.0, 90.0, 20.0, 10.0));
    }

    #[test]
    fn clamp_shrinks_oversized_box() {
        let bbox = BoundingBox::new(-10.0, 10.0, 150.0, 30.0).clamp(100.0, 50.0);
        assert_eq!(bbox, BoundingBox::new(0.0, 10.0, 100.0, 30.0));
    }

    #[test]
    fn clamp_is_idempotent() {
        let boxes = [
            BoundingBox::new(-5.0, -5.0, 20.0, 20.0),
            BoundingBox::new(90.0, 40.0, 30.0, 30.0),
            BoundingBox::new(10.0, 10.0, 500.0, 500.0),
            BoundingBox::new(3.5, 7.25, -4.0, 12.0),
            BoundingBox::new(20.0, 20.0, 10.0, 10.0),
        ];
        for bbox in boxes {
            let once = bbox.clamp(100.0, 60.0);
            let twice = once.clamp(100.0, 60.0);
            assert_eq!(once, twice);
            assert!(once.x >= 0.0 && once.y >= 0.0);
            assert!(once.right() <= 100.0 && once.bottom() <= 60.0);
        }
    }

    #[test]
    fn bbox_serializes_as_array() {
        let bbox = BoundingBox::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(serde_json::to_string(&bbox).unwrap(), "[1.0,2.0,3.0,4.0]");
        let back: BoundingBox = serde_json::from_str("[1.0,2.0,3.0,4.0]").unwrap();
        assert_eq!(back, bbox);
    }

    #[test]
    fn raw_detection_clamps_confidence() {
        let det = RawDetection::new(BoundingBox::default(), 1.7, 0, "test_tube".to_string());
        assert_eq!(det.confidence, 1.0);
    }
}
