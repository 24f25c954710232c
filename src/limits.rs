/// トークナイザーの制限とフレーミングの厳格さの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderLimits {
    /// ステータスラインとヘッダー全体の最大サイズ (デフォルト: 64KB)
    pub max_head_size: usize,
    /// 最大ヘッダー数 (デフォルト: 100)
    ///
    /// chunked のトレーラーにも同じ制限を適用する。
    pub max_headers_count: usize,
    /// 最大ヘッダー行長 (デフォルト: 8KB)
    pub max_header_line_size: usize,
    /// 最大チャンクサイズ行長 (デフォルト: 64バイト)
    ///
    /// チャンクサイズは 16 進数で表現されるため、通常は非常に短い。
    /// チャンク拡張を含めてもこの長さに収まる想定。
    pub max_chunk_line_size: usize,
    /// Transfer-Encoding: chunked と Content-Length が同時にあればエラーにする (デフォルト: true)
    ///
    /// false の場合は chunked を優先し、Content-Length はフレーミングに使わない。
    /// 行儀の悪いバックエンドを許容する必要がある環境向け。
    pub strict_framing: bool,
}

impl Default for DecoderLimits {
    fn default() -> Self {
        Self {
            max_head_size: 64 * 1024, // 64KB
            max_headers_count: 100,
            max_header_line_size: 8 * 1024, // 8KB
            max_chunk_line_size: 64,        // 64 bytes
            strict_framing: true,
        }
    }
}

impl DecoderLimits {
    /// 制限なしの設定を作成
    pub fn unlimited() -> Self {
        Self {
            max_head_size: usize::MAX,
            max_headers_count: usize::MAX,
            max_header_line_size: usize::MAX,
            max_chunk_line_size: usize::MAX,
            strict_framing: true,
        }
    }
}
