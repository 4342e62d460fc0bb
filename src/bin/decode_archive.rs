use anyhow::{Context, Result};
use std::time::Instant;

use yolo_v3_postprocess::{archive, postprocess, Config, LogObserver, Tensor};

fn main() -> Result<()> {
    // 特徴マップのアーカイブ
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tensors.tar.gz".to_string());

    let config = Config::default();
    config.validate()?;

    let maps = archive::read_feature_maps(&path, &config)
        .with_context(|| format!("failed to read {}", path))?;
    let views = maps
        .iter()
        .map(|m| m.view())
        .collect::<Result<Vec<Tensor>, _>>()?;

    let start = Instant::now();

    // 後処理を開始
    let result = postprocess::post_process_with_observer(&views, &config, &LogObserver)?;

    let end = start.elapsed();
    let t = end.as_secs_f64() * 1000.0;
    for d in result.iter() {
        println!("{}", d);
    }
    println!("{} detections", result.len());
    println!("Processing time:{:.03}ms", t);

    Ok(())
}
