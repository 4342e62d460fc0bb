//! 後処理で発生するエラーを定義するモジュール

use thiserror::Error;

/// 後処理の結果型
pub type Result<T> = std::result::Result<T, PostProcessError>;

/// 後処理で発生するエラー
#[derive(Debug, Error)]
pub enum PostProcessError {
    /// テンソルの形状が設定と一致しない
    #[error("shape mismatch at scale {scale}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        scale: usize,
        expected: [usize; 3],
        actual: [usize; 3],
    },

    /// 宣言された形状の外側を読もうとした
    #[error("tensor index {index:?} out of range for shape {shape:?}")]
    IndexOutOfRange { index: [usize; 3], shape: [usize; 3] },

    /// ストライドから求めた最大オフセットがバッファに収まらない
    #[error("tensor buffer too small: needed {needed} elements, got {got}")]
    BufferTooSmall { needed: usize, got: usize },

    /// 特徴マップの数がスケール数と一致しない
    #[error("expected {expected} feature maps, got {got}")]
    FeatureMapCount { expected: usize, got: usize },

    /// 推論エンジンがテンソルを出力できなかった
    #[error("inference unavailable: {0}")]
    InferenceUnavailable(String),

    /// 設定値が不正
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// テンソルアーカイブの内容が不正
    #[error("tensor archive error: {0}")]
    Archive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
