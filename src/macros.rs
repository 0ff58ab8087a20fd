/// 生成每个请求可以独立设置的选项相关代码的宏。目前只支持超时设置
#[macro_export]
macro_rules! add_per_request_options {
    ($type_name:ty) => {
        impl $type_name {
            /// 针对此次操作设置超时时间，单位为毫秒。超时之后返回 [`InfluxError::Timeout`](`crate::error::InfluxError::Timeout`)
            pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
                self.timeout_ms = Some(timeout_ms);
                self
            }

            /// 取消此次操作的超时设置（也就是不会超时）。HTTP 客户端自身的超时设置仍然有效
            pub fn no_timeout(mut self) -> Self {
                self.timeout_ms = None;
                self
            }
        }
    };
}

/// 在 [`InfluxClient`](`crate::InfluxClient`) 上生成和 [`Session`](`crate::session::Session`) 同名的方法。
/// 生成的方法先通过 `session()` 得到一个新的会话，然后在会话上调用同名方法
macro_rules! forward_to_session {
    ($( $(#[$meta:meta])* fn $name:ident(&self $(, $arg:ident : $ty:ty)*); )*) => {
        impl $crate::InfluxClient {
            $(
                $(#[$meta])*
                pub fn $name(&self $(, $arg: $ty)*) -> $crate::session::Session {
                    self.session().$name($($arg),*)
                }
            )*
        }
    };
}

pub(crate) use forward_to_session;
