use image::{DynamicImage, GenericImageView, Rgba, RgbaImage, imageops::FilterType};
use ndarray::{Array, Array4};
use std::path::Path;

use crate::color::bounds::BoundingBox;
use crate::error::{Result, TubeError};

/// 图像中的整数像素区域
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRegion {
    /// 将浮点边界框转换为图像内的像素区域，越界部分被裁掉
    pub fn from_bbox(bbox: &BoundingBox, image_width: u32, image_height: u32) -> Self {
        let x = (bbox.x.max(0.0).floor() as u32).min(image_width);
        let y = (bbox.y.max(0.0).floor() as u32).min(image_height);
        let width = (bbox.width.max(0.0).floor() as u32).min(image_width - x);
        let height = (bbox.height.max(0.0).floor() as u32).min(image_height - y);
        Self { x, y, width, height }
    }

    /// 区域中心的子窗口
    ///
    /// 偏移和尺寸都按比例向下取整，相对于整幅图像给出。
    pub fn center(&self, offset_ratio: f32, size_ratio: f32) -> Self {
        Self {
            x: self.x + (self.width as f32 * offset_ratio).floor() as u32,
            y: self.y + (self.height as f32 * offset_ratio).floor() as u32,
            width: (self.width as f32 * size_ratio).floor() as u32,
            height: (self.height as f32 * size_ratio).floor() as u32,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// 加载图像文件
///
/// # 参数
/// * `path` - 图像文件路径
///
/// # 返回值
/// 返回加载的DynamicImage对象
///
/// # 错误处理
/// 文件不存在或无法解码时返回Err
pub fn load_image(path: impl AsRef<Path>) -> Result<DynamicImage> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(TubeError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("图像文件不存在: {:?}", path),
        )));
    }
    Ok(image::open(path)?)
}

/// 按行优先顺序采样区域内的像素
///
/// 采样步长使总采样数不超过 `max_samples`（至少为 1），
/// 区域越界的部分不会被读取。
///
/// # 参数
/// * `image` - RGBA 像素缓冲
/// * `region` - 采样区域
/// * `max_samples` - 采样数量上限
///
/// # 返回值
/// 返回采样得到的像素
pub fn sample_pixels(image: &RgbaImage, region: PixelRegion, max_samples: usize) -> Vec<Rgba<u8>> {
    let region_width = region.width.min(image.width().saturating_sub(region.x));
    let region_height = region.height.min(image.height().saturating_sub(region.y));
    let total = region_width as usize * region_height as usize;
    if total == 0 {
        return Vec::new();
    }
    let stride = (total / max_samples.max(1)).max(1);

    (0..total)
        .step_by(stride)
        .map(|i| {
            let x = region.x + (i % region_width as usize) as u32;
            let y = region.y + (i / region_width as usize) as u32;
            *image.get_pixel(x, y)
        })
        .collect()
}

/// 裁剪区域并缩放为固定尺寸
pub fn crop_resized(image: &RgbaImage, region: PixelRegion, size: u32) -> RgbaImage {
    let cropped = image::imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image();
    image::imageops::resize(&cropped, size, size, FilterType::Triangle)
}

/// 调整图像大小以适应模型输入
///
/// 使用CatmullRom插值算法将图像调整为指定尺寸。
pub fn resize_image(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    img.resize_exact(width, height, FilterType::CatmullRom)
}

/// 将图像转换为检测模型输入张量
///
/// 将图像转换为模型所需的四维张量格式，包括：
/// 1. 归一化像素值到[0, 1]范围
/// 2. 调整通道顺序为RGB
/// 3. 调整维度顺序为NCHW格式
///
/// # 参数
/// * `img` - 已缩放到模型输入尺寸的图像
/// * `input_height` - 输入图像高度
/// * `input_width` - 输入图像宽度
///
/// # 返回值
/// 返回形状为(1, 3, height, width)的四维张量
pub fn image_to_tensor(img: &DynamicImage, input_height: usize, input_width: usize) -> Array4<f32> {
    let mut tensor = Array::zeros((1, 3, input_height, input_width));

    for pixel in img.pixels() {
        let x = pixel.0 as usize;
        let y = pixel.1 as usize;
        if x >= input_width || y >= input_height {
            continue;
        }
        let [r, g, b, _] = pixel.2.0;

        tensor[[0, 0, y, x]] = (r as f32) / 255.0;
        tensor[[0, 1, y, x]] = (g as f32) / 255.0;
        tensor[[0, 2, y, x]] = (b as f32) / 255.0;
    }

    tensor
}

/// 将 RGBA 图像转换为 NHWC 格式、值域 [0, 1] 的张量，用于颜色分类网络
pub fn rgba_to_nhwc(img: &RgbaImage) -> Array4<f32> {
    let (width, height) = img.dimensions();
    let mut tensor = Array::zeros((1, height as usize, width as usize, 3));
    for (x, y, pixel) in img.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, y as usize, x as usize, c]] = pixel.0[c] as f32 / 255.0;
        }
    }
    tensor
}
