use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use tubehue::{ColorMethod, PipelineConfig, TubeDetector, draw_detections, load_class_names, load_image};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MethodArg {
    Hsv,
    Cnn,
}

impl From<MethodArg> for ColorMethod {
    fn from(method: MethodArg) -> Self {
        match method {
            MethodArg::Hsv => ColorMethod::Hsv,
            MethodArg::Cnn => ColorMethod::Cnn,
        }
    }
}

/// 试管检测与颜色分类
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 输入图片路径
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    /// JSON 配置文件，命令行参数会覆盖其中的同名字段
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// 检测模型 (ONNX)，缺失时以演示模式运行
    #[arg(long, value_name = "FILE")]
    model: Option<PathBuf>,

    /// CNN 颜色分类模型 (ONNX)
    #[arg(long, value_name = "FILE")]
    color_model: Option<PathBuf>,

    /// 类别名称表 (JSON 数组)
    #[arg(long, value_name = "FILE")]
    class_names: Option<PathBuf>,

    /// 颜色分类方法
    #[arg(long, value_enum)]
    method: Option<MethodArg>,

    /// 置信度阈值 (0.0 - 1.0)
    #[arg(long, value_name = "THRESHOLD")]
    confidence: Option<f32>,

    /// NMS IoU 阈值 (0.0 - 1.0)
    #[arg(long, value_name = "THRESHOLD")]
    iou: Option<f32>,

    /// 检测结果 JSON 输出路径，省略时打印到标准输出
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// 绘制了检测框的图片输出路径
    #[arg(long, value_name = "FILE")]
    annotated: Option<PathBuf>,
}

fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("无法读取配置文件 {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(path) = &args.model {
        config = config.with_detector_model_path(path);
    }
    if let Some(path) = &args.color_model {
        config = config.with_color_model_path(path);
    }
    if let Some(path) = &args.class_names {
        let names = load_class_names(path)
            .with_context(|| format!("无法读取类别名称表 {}", path.display()))?;
        config = config.with_class_names(names);
    }
    if let Some(method) = args.method {
        config = config.with_color_method(method.into());
    }
    if let Some(confidence) = args.confidence {
        config = config.with_confidence_threshold(confidence);
    }
    if let Some(iou) = args.iou {
        config = config.with_iou_threshold(iou);
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;

    let mut detector = TubeDetector::load(config).context("检测器初始化失败")?;
    if detector.is_demo_mode() {
        eprintln!("⚠️  检测模型不可用, 以演示模式运行");
    }

    let image = load_image(&args.input)
        .with_context(|| format!("无法加载图片 {}", args.input.display()))?;

    let start_time = Instant::now();
    let detections = detector.detect(&image)?;
    let elapsed = start_time.elapsed();

    eprintln!("检测到 {} 个试管, 耗时 {:?}", detections.len(), elapsed);
    for (index, detection) in detections.iter().enumerate() {
        let bbox = &detection.bbox;
        eprintln!(
            "  #{} {} {:.1}% [{:.0}, {:.0}, {:.0}, {:.0}] {} {} ({}%, {:?})",
            index + 1,
            detection.class_name,
            detection.confidence * 100.0,
            bbox.x,
            bbox.y,
            bbox.width,
            bbox.height,
            detection.color.emoji,
            detection.color.name,
            detection.color.confidence,
            detection.color.method,
        );
    }

    let json = serde_json::to_string_pretty(&detections)?;
    match &args.output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("无法写入 {}", path.display()))?,
        None => println!("{}", json),
    }

    if let Some(path) = &args.annotated {
        let annotated = draw_detections(&image, &detections)?;
        annotated
            .save(path)
            .with_context(|| format!("无法保存图片 {}", path.display()))?;
        eprintln!("结果已保存到 {}", path.display());
    }

    Ok(())
}
