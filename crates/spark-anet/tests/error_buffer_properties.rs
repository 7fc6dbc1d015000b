//! `ErrorBuffer` 截断性质验证
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：诊断缓冲必须对任意 UTF-8 输入保持“只截断、不破坏”：结果永远短于
//!   `ANET_ERR_LEN`，永远是原文的前缀，且截断点落在字符边界；
//! - **设计手法 (How)**：用 Proptest 生成混合 ASCII 与多字节字符的长文本，覆盖截断点落在
//!   多字节字符中间的情形；
//! - **合同 (What)**：短于容量的文本原样保存；连续写入只保留最后一条。

use proptest::prelude::*;
use spark_anet::{ANET_ERR_LEN, AnetError, ErrorBuffer, ReportExt, connect};

fn diagnostics() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![Just('a'), Just('é'), Just('界'), Just('🦀'), any::<char>()],
        0..(ANET_ERR_LEN * 2),
    )
    .prop_map(|chars| chars.into_iter().collect())
}

proptest! {
    #[test]
    fn prop_truncation_keeps_a_prefix_within_capacity(text in diagnostics()) {
        let mut buffer = ErrorBuffer::new();
        buffer.set(&text);

        prop_assert!(buffer.as_str().len() < ANET_ERR_LEN);
        prop_assert!(text.starts_with(buffer.as_str()));
        if text.len() < ANET_ERR_LEN {
            prop_assert_eq!(buffer.as_str(), text.as_str());
        } else {
            // 截断只会丢掉不足一个字符的尾部。
            prop_assert!(ANET_ERR_LEN - 1 - buffer.as_str().len() < 4);
        }
    }

    #[test]
    fn prop_last_write_wins(first in diagnostics(), second in "[a-z ]{0,64}") {
        let mut buffer = ErrorBuffer::new();
        buffer.set(&first);
        buffer.set(&second);
        prop_assert_eq!(buffer.as_str(), second.as_str());
    }
}

#[test]
fn report_fills_buffer_only_on_failure() {
    let mut buffer = ErrorBuffer::new();
    let result: Result<(), AnetError> =
        connect("127.0.0.1", "no-such-spark-service").map(drop).report(Some(&mut buffer));

    assert!(result.is_err());
    assert!(buffer.as_str().starts_with("can't resolve 127.0.0.1: "));

    let ok: Result<u8, AnetError> = Ok(7);
    let mut untouched = ErrorBuffer::new();
    assert_eq!(ok.report(Some(&mut untouched)).ok(), Some(7));
    assert!(untouched.is_empty());
}
