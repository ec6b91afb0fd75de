//! 线上数据模型与序列化器契约。
//!
//! 单次调用在线上表示为只有一帧的链；链式调用的每一步都是一帧，接收端按顺序回放。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CodecError;

/// 链中的一帧：一次操作调用。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvocationFrame {
    /// 声明该操作的契约名称，仅用于诊断。
    pub contract: String,
    pub method: String,
    pub signature: String,
    pub args: Vec<Value>,
}

/// 一次完整的线上请求。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    /// 链根对象所属的契约，接收端据此选择根处理器。
    pub target: String,
    pub frames: Vec<InvocationFrame>,
    /// 为 `false` 时接收端不回送响应。
    pub expects_result: bool,
}

impl WireRequest {
    /// 链上的方法名路径，例如 `["a", "b"]`。
    pub fn path(&self) -> Vec<&str> {
        self.frames.iter().map(|frame| frame.method.as_str()).collect()
    }

    /// 最后一帧（终端调用）。
    pub fn terminal(&self) -> Option<&InvocationFrame> {
        self.frames.last()
    }
}

/// 线上响应。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WireResponse {
    Success { value: Value },
    Failure { code: String, message: String },
}

impl WireResponse {
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        WireResponse::Failure {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// 请求与响应的字节编解码器。
///
/// # 契约说明（What）
/// - 编码与解码必须互逆：同一实现解码自己编码的字节得到相等的值；
/// - 实现需满足 `Send + Sync + 'static`，以 `Arc<dyn Serializer>` 被发送器与接收端共享；
/// - 失败以 [`CodecError`] 返回，并在 `context` 中注明环节。
pub trait Serializer: Send + Sync + 'static {
    /// 编解码器名称，用于日志。
    fn name(&self) -> &'static str;

    fn encode_request(&self, request: &WireRequest) -> Result<Vec<u8>, CodecError>;

    fn decode_request(&self, bytes: &[u8]) -> Result<WireRequest, CodecError>;

    fn encode_response(&self, response: &WireResponse) -> Result<Vec<u8>, CodecError>;

    fn decode_response(&self, bytes: &[u8]) -> Result<WireResponse, CodecError>;
}

/// 基于 `serde_json` 的默认编解码器。
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode_request(&self, request: &WireRequest) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(request).map_err(|err| CodecError::json("encode request", &err))
    }

    fn decode_request(&self, bytes: &[u8]) -> Result<WireRequest, CodecError> {
        serde_json::from_slice(bytes).map_err(|err| CodecError::json("decode request", &err))
    }

    fn encode_response(&self, response: &WireResponse) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(response).map_err(|err| CodecError::json("encode response", &err))
    }

    fn decode_response(&self, bytes: &[u8]) -> Result<WireResponse, CodecError> {
        serde_json::from_slice(bytes).map_err(|err| CodecError::json("decode response", &err))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn response_is_tagged_by_status() {
        let bytes = JsonSerializer
            .encode_response(&WireResponse::Success { value: json!(7) })
            .unwrap();
        assert_eq!(
            serde_json::from_slice::<Value>(&bytes).unwrap(),
            json!({"status": "success", "value": 7})
        );
    }

    #[test]
    fn malformed_response_reports_context() {
        let err = JsonSerializer.decode_response(b"{not json").unwrap_err();
        assert_eq!(err.context(), "decode response");
    }
}
