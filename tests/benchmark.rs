use image::{Rgba, RgbaImage};
use std::time::{Duration, Instant};
use tubehue::{DetectionPipeline, PipelineConfig, RawOutputTensor};

/// 构造 YOLOv8 默认导出格式 `[1, 5, 8400]` 的输出，约 2% 的候选框超过阈值
fn full_output() -> RawOutputTensor {
    let n = 8400;
    let mut data = vec![0.0f32; 5 * n];
    for i in 0..n {
        let f = i as f32;
        data[i] = (f * 37.0) % 640.0;
        data[n + i] = (f * 53.0) % 640.0;
        data[2 * n + i] = 20.0 + f % 40.0;
        data[3 * n + i] = 40.0 + f % 80.0;
        data[4 * n + i] = if i % 50 == 0 { 0.6 + (i % 7) as f32 * 0.05 } else { 0.1 };
    }
    RawOutputTensor::new(vec![1, 5, n], data)
}

fn striped_image(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, _| {
        if (x / 40) % 2 == 0 {
            Rgba([0x00, 0x66, 0xCC, 0xFF])
        } else {
            Rgba([0x99, 0x33, 0xCC, 0xFF])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_performance() -> Result<(), Box<dyn std::error::Error>> {
        println!("后处理流水线速度基准测试");
        println!("========================");

        let output = full_output();
        let image = striped_image(1280, 720);
        println!("原始图像尺寸: {}x{}", image.width(), image.height());

        let mut pipeline = DetectionPipeline::from_config(PipelineConfig::default())?;

        // 预热运行一次
        let detections = pipeline.run(&output, &image);
        println!("单帧检测数量: {}", detections.len());
        assert!(!detections.is_empty());

        let iterations = 100;
        let mut total_duration = Duration::new(0, 0);
        let mut min_duration = Duration::new(u64::MAX, 0);
        let mut max_duration = Duration::new(0, 0);

        for _ in 0..iterations {
            let start = Instant::now();
            let frame = pipeline.run(&output, &image);
            let duration = start.elapsed();
            assert_eq!(frame, detections);

            total_duration += duration;
            min_duration = min_duration.min(duration);
            max_duration = max_duration.max(duration);
        }

        let average_duration = total_duration / iterations;
        println!("\n性能统计 ({} 帧):", iterations);
        println!("平均耗时: {:?} ({} ms)", average_duration, average_duration.as_millis());
        println!("最小耗时: {:?}", min_duration);
        println!("最大耗时: {:?}", max_duration);
        println!("平均 FPS: {:.2}", 1.0 / average_duration.as_secs_f64());

        assert!(
            average_duration.as_millis() < 1000,
            "平均处理时间过长: {:?} ms",
            average_duration.as_millis()
        );

        Ok(())
    }
}
