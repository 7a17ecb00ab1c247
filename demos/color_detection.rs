use tubehue::{PipelineConfig, TubeDetector, draw_detections, load_image};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("试管颜色检测示例");
    println!("========================");

    // 注意：确保模型文件和图像文件路径正确，模型缺失时以演示模式运行
    let config = PipelineConfig::default()
        .with_detector_model_path("models/best.onnx")
        .with_confidence_threshold(0.5)
        .with_iou_threshold(0.2);
    let mut detector = TubeDetector::load(config)?;
    detector.warm_up();
    println!("模型信息: {}", serde_json::to_string(&detector.model_info())?);

    let image = load_image("data/test/tubes.jpg")?;
    println!("原始图像尺寸: {}x{}", image.width(), image.height());

    println!("正在执行检测...");
    let detections = detector.detect(&image)?;
    println!("检测到 {} 个试管", detections.len());

    for (i, detection) in detections.iter().enumerate() {
        println!(
            "试管 {}: {} - 置信度: {:.2} - 位置: ({:.1}, {:.1}, {:.1}, {:.1}) - 颜色: {} {} ({}%)",
            i + 1,
            detection.class_name,
            detection.confidence,
            detection.bbox.x,
            detection.bbox.y,
            detection.bbox.width,
            detection.bbox.height,
            detection.color.emoji,
            detection.color.name,
            detection.color.confidence
        );
    }

    println!("正在绘制检测结果...");
    let result_image = draw_detections(&image, &detections)?;

    let output_path = "results/color_detection_result.png";
    result_image.save(output_path)?;
    println!("结果已保存到: {}", output_path);

    println!("\n颜色说明:");
    println!("- 蓝色框: 蓝色试管");
    println!("- 紫色框: 紫色试管");

    Ok(())
}
