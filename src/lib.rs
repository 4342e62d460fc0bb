//! # YOLOv3 後処理ライブラリ
//!
//! このクレートは、YOLOv3 の3スケールの出力テンソルを物体検出結果へ変換するための
//! Rustライブラリです。推論そのものは外部のエンジンが行います。
//!
//! ## 主な機能
//!
//! 1. **特徴マップのデコード**: アンカーボックスを使って各グリッドの出力を候補ボックスに変換します。
//! 2. **NMS**: 重なった候補を取り除き、スコア順に最大 `max_detections` 件を返します。
//! 3. **推論エンジンとの接続**: [`yolov3::InferenceEngine`] を実装したエンジンの出力をそのまま後処理します。
//! 4. **テンソルアーカイブ**: tar.gz に保存した特徴マップを読み書きします。
//! 5. **描画**: 検出結果を表示面の座標へ変換し、画像に重ねます (`overlay` 機能)。
//!
//! ## Example
//! ```no_run
//! use yolo_v3_postprocess::{archive, postprocess, Config, Tensor};
//!
//! let config = Config::default();
//! let maps = archive::read_feature_maps("tensors.tar.gz", &config)?;
//! let views = maps.iter().map(|m| m.view()).collect::<Result<Vec<Tensor>, _>>()?;
//! let result = postprocess::post_process(&views, &config)?;
//! # Ok::<(), yolo_v3_postprocess::PostProcessError>(())
//! ```

pub mod archive;
pub mod config;
pub mod decode;
pub mod detection_result;
pub mod error;
pub mod geometry;
pub mod nms;
pub mod observer;
#[cfg(feature = "overlay")]
pub mod overlay;
pub mod postprocess;
pub mod tensor;
pub mod yolov3;

pub use config::{Anchor, AnchorTable, Config, SuppressionMode};
pub use detection_result::{Candidate, Detection, DetectionData};
pub use error::{PostProcessError, Result};
pub use geometry::{iou, sigmoid, Rect};
pub use observer::{DetectionObserver, LogObserver, NoopObserver};
pub use postprocess::{post_process, run};
pub use tensor::{Tensor, TensorData};
pub use yolov3::{InferenceEngine, YoloV3};
