//! 推論エンジンと後処理をまとめて扱うモジュール

use log::{error, info};

use crate::config::Config;
use crate::detection_result::Detection;
use crate::error::{PostProcessError, Result};
use crate::observer::{DetectionObserver, NoopObserver};
use crate::postprocess;
use crate::tensor::{Tensor, TensorData};

/// 特徴マップを出力する推論エンジン
///
/// エンジン自体はこのクレートの外側にあり、スケール順の特徴マップを返すことだけを要求します。
pub trait InferenceEngine {
    /// エンジンへの入力 (画像バッファなど)
    type Input: ?Sized;

    /// 推論を実行します。
    ///
    /// # Return
    /// * スケール順の特徴マップ
    fn predict(&mut self, input: &Self::Input) -> anyhow::Result<Vec<TensorData>>;
}

/// YOLOv3 の推論と後処理をコントロールする構造体
pub struct YoloV3<E> {
    engine: E,
    config: Config,
    observer: Box<dyn DetectionObserver + Send>,
}

impl<E: InferenceEngine> YoloV3<E> {
    /// 新しい `YoloV3` インスタンスを作成します。
    ///
    /// # Args
    /// * `engine` - 推論エンジン
    /// * `config` - 後処理の設定
    ///
    /// # Return
    /// * 設定が不正な場合は `InvalidConfig`
    pub fn new(engine: E, config: Config) -> Result<Self> {
        config.validate()?;
        info!(
            "yolo: {} classes, grids {:?}, conf {}, iou {}",
            config.num_classes, config.grid_sizes, config.confidence_threshold, config.iou_threshold
        );
        Ok(Self {
            engine,
            config,
            observer: Box::new(NoopObserver),
        })
    }

    /// 途中経過を受け取るオブザーバを設定します。
    pub fn with_observer<O: DetectionObserver + Send + 'static>(mut self, observer: O) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// 推論を実行し、特徴マップを返します。
    ///
    /// # Return
    /// * エンジンが失敗した場合は `InferenceUnavailable`
    pub fn start_processing(&mut self, input: &E::Input) -> Result<Vec<TensorData>> {
        self.engine.predict(input).map_err(|e| {
            error!("inference failed: {:#}", e);
            PostProcessError::InferenceUnavailable(format!("{:#}", e))
        })
    }

    /// 推論と後処理を実行します。
    ///
    /// # Args
    /// * `input` - エンジンへの入力
    ///
    /// # Return
    /// * 物体検出結果
    pub fn start(&mut self, input: &E::Input) -> Result<Vec<Detection>> {
        let outputs = self.start_processing(input)?;
        let views = outputs
            .iter()
            .map(|t| t.view())
            .collect::<Result<Vec<Tensor>>>()?;

        postprocess::post_process_with_observer(&views, &self.config, self.observer.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    struct Fixed(Vec<TensorData>);

    impl InferenceEngine for Fixed {
        type Input = ();

        fn predict(&mut self, _: &()) -> anyhow::Result<Vec<TensorData>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl InferenceEngine for Broken {
        type Input = [u8];

        fn predict(&mut self, input: &[u8]) -> anyhow::Result<Vec<TensorData>> {
            bail!("model rejected {} bytes", input.len())
        }
    }

    #[test]
    fn engine_failure_is_inference_unavailable() {
        let mut yolo = YoloV3::new(Broken, Config::default()).unwrap();
        match yolo.start(&[0u8; 4]) {
            Err(PostProcessError::InferenceUnavailable(msg)) => {
                assert!(msg.contains("4 bytes"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn partial_output_is_not_decoded() {
        let config = Config::default();
        let maps = vec![TensorData::zeros([24, 13, 13])];
        let mut yolo = YoloV3::new(Fixed(maps), config).unwrap();
        assert!(matches!(
            yolo.start(&()),
            Err(PostProcessError::FeatureMapCount { .. })
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = Config::default().with_max_detections(0);
        assert!(YoloV3::new(Fixed(vec![]), config).is_err());
    }

    #[test]
    fn zero_outputs_give_empty_result() {
        let config = Config::default();
        let maps = (0..3)
            .map(|s| TensorData::zeros(config.expected_shape(s).unwrap()))
            .collect();
        let mut yolo = YoloV3::new(Fixed(maps), config)
            .unwrap()
            .with_observer(crate::observer::LogObserver);
        assert!(yolo.start(&()).unwrap().is_empty());
    }
}
