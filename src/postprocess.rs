//! YOLOv3 の3スケールの出力を後処理するためのモジュール

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::config::Config;
use crate::decode::{check_shape, decode_feature_map};
use crate::detection_result::{Candidate, Detection};
use crate::error::{PostProcessError, Result};
use crate::nms::suppress;
use crate::observer::{DetectionObserver, NoopObserver};
use crate::tensor::Tensor;

/// 1スケール分のデコード
fn decode_scale(
    scale: usize,
    tensor: &Tensor,
    config: &Config,
    observer: &dyn DetectionObserver,
) -> Result<Vec<Candidate>> {
    let grid_size = config.grid_sizes[scale];
    let anchors = config.anchors.scale(scale).ok_or_else(|| {
        PostProcessError::InvalidConfig(format!("no anchors for scale {}", scale))
    })?;

    let candidates = decode_feature_map(tensor, scale, grid_size, anchors, config)?;
    for c in candidates.iter() {
        observer.on_candidate(scale, c);
    }
    observer.on_scale_decoded(scale, candidates.len());
    Ok(candidates)
}

#[cfg(not(feature = "rayon"))]
fn decode_all(
    feature_maps: &[Tensor],
    config: &Config,
    observer: &dyn DetectionObserver,
) -> Result<Vec<Vec<Candidate>>> {
    feature_maps
        .iter()
        .enumerate()
        .map(|(scale, tensor)| decode_scale(scale, tensor, config, observer))
        .collect()
}

/// スケールごとのデコードを rayon で並列化する。結果はスケール順に並ぶ
#[cfg(feature = "rayon")]
fn decode_all(
    feature_maps: &[Tensor],
    config: &Config,
    observer: &dyn DetectionObserver,
) -> Result<Vec<Vec<Candidate>>> {
    feature_maps
        .par_iter()
        .enumerate()
        .map(|(scale, tensor)| decode_scale(scale, tensor, config, observer))
        .collect()
}

/// `post_process_with_observer` は、全スケールの特徴マップから検出結果を求めます。
///
/// # Args
/// * `feature_maps` - スケール順の特徴マップ (`config.grid_sizes` と同じ数)
/// * `config` - 設定
/// * `observer` - 途中経過を受け取るフック
///
/// # Return
/// * スコアの降順に並んだ検出結果 (`config.max_detections` 件以下)
///
/// 設定が不正なら `InvalidConfig` を、どれか1つでも形状が一致しなければ
/// デコードを始める前に `ShapeMismatch` を返します。
pub fn post_process_with_observer(
    feature_maps: &[Tensor],
    config: &Config,
    observer: &dyn DetectionObserver,
) -> Result<Vec<Detection>> {
    config.validate()?;
    if feature_maps.len() != config.grid_sizes.len() {
        return Err(PostProcessError::FeatureMapCount {
            expected: config.grid_sizes.len(),
            got: feature_maps.len(),
        });
    }
    for (scale, (tensor, &grid_size)) in feature_maps.iter().zip(&config.grid_sizes).enumerate() {
        check_shape(tensor, scale, grid_size, config)?;
    }

    // 全スケールの候補をスケール順に結合
    let candidates: Vec<Candidate> = decode_all(feature_maps, config, observer)?
        .into_iter()
        .flatten()
        .collect();

    // NMS を適用
    let detections = suppress(
        &candidates,
        config.max_detections,
        config.iou_threshold,
        config.suppression,
    );
    observer.on_detections(&detections);
    Ok(detections)
}

/// 全スケールの特徴マップから検出結果を求めます。
pub fn post_process(feature_maps: &[Tensor], config: &Config) -> Result<Vec<Detection>> {
    post_process_with_observer(feature_maps, config, &NoopObserver)
}

/// 13, 26, 52 グリッドの3つの特徴マップから検出結果を求めます。
///
/// # Args
/// * `yolo_out_0`, `yolo_out_1`, `yolo_out_2` - YOLOの出力 (スケール順)
/// * `config` - 設定
pub fn run(
    yolo_out_0: &Tensor,
    yolo_out_1: &Tensor,
    yolo_out_2: &Tensor,
    config: &Config,
) -> Result<Vec<Detection>> {
    post_process(&[*yolo_out_0, *yolo_out_1, *yolo_out_2], config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorData;

    fn zero_maps(config: &Config) -> Vec<TensorData> {
        (0..config.grid_sizes.len())
            .map(|s| TensorData::zeros(config.expected_shape(s).unwrap()))
            .collect()
    }

    #[test]
    fn all_zero_tensors_give_no_detections() {
        let config = Config::default();
        let maps = zero_maps(&config);
        let views: Vec<Tensor> = maps.iter().map(|m| m.view().unwrap()).collect();
        assert!(post_process(&views, &config).unwrap().is_empty());
    }

    #[test]
    fn wrong_feature_map_count() {
        let config = Config::default();
        let maps = zero_maps(&config);
        let views: Vec<Tensor> = maps.iter().take(2).map(|m| m.view().unwrap()).collect();
        assert!(matches!(
            post_process(&views, &config),
            Err(PostProcessError::FeatureMapCount {
                expected: 3,
                got: 2
            })
        ));
    }

    #[test]
    fn scales_out_of_order_are_a_shape_mismatch() {
        let config = Config::default();
        let maps = zero_maps(&config);
        let a = maps[0].view().unwrap();
        let b = maps[1].view().unwrap();
        let c = maps[2].view().unwrap();
        match run(&b, &a, &c, &config) {
            Err(PostProcessError::ShapeMismatch { scale, .. }) => assert_eq!(scale, 0),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn invalid_config_is_rejected_before_decoding() {
        let mut config = Config::default();
        let maps = zero_maps(&config);
        let views: Vec<Tensor> = maps.iter().map(|m| m.view().unwrap()).collect();

        // 形状は一致するが、高さが幅と異なる
        config.input_height = 320;
        assert!(matches!(
            post_process(&views, &config),
            Err(PostProcessError::InvalidConfig(_))
        ));

        let config = Config::default().with_thresholds(0.7, f32::NAN);
        assert!(matches!(
            run(&views[0], &views[1], &views[2], &config),
            Err(PostProcessError::InvalidConfig(_))
        ));
    }
}
