use std::sync::RwLock;

use super::types::Message;

/// 直近Nメッセージを保持する固定長リングバッファ
///
/// 容量は構築時に固定。満杯になると最も古いスロットを上書きする。
/// 未書き込みスロットは`None`で区別し、読み出しには含めない。
/// 書き込みは排他ロック、読み出しは共有ロックで直列化するため、
/// 読み手が書き込み途中のスロットを観測することはない。
pub struct RingBuffer {
    inner: RwLock<RingBufferInner>,
}

struct RingBufferInner {
    slots: Vec<Option<Message>>,
    /// 次に書き込むスロットの位置
    cursor: usize,
}

impl RingBuffer {
    /// 指定容量のリングバッファを作成
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            inner: RwLock::new(RingBufferInner {
                slots: (0..capacity).map(|_| None).collect(),
                cursor: 0,
            }),
        }
    }

    /// 容量を取得
    pub fn capacity(&self) -> usize {
        self.inner.read().expect("ring buffer lock poisoned").slots.len()
    }

    /// メッセージを追加する（O(1)）
    ///
    /// カーソル位置のスロットを上書きし、カーソルを容量で
    /// 割った剰余で進める。
    pub fn add(&self, msg: Message) {
        let mut inner = self.inner.write().expect("ring buffer lock poisoned");
        let cursor = inner.cursor;
        inner.slots[cursor] = Some(msg);
        inner.cursor = (cursor + 1) % inner.slots.len();
    }

    /// すべてのメッセージを時系列順（古い順）で返す
    pub fn get_all(&self) -> Vec<Message> {
        let inner = self.inner.read().expect("ring buffer lock poisoned");
        let capacity = inner.slots.len();

        // カーソル位置が最も古いスロット
        (0..capacity)
            .filter_map(|i| inner.slots[(inner.cursor + i) % capacity].clone())
            .collect()
    }

    /// 直近n件のメッセージを時系列順で返す
    ///
    /// nが容量を超える場合は容量件まで。`get_all()`の結果の
    /// 末尾n件と常に一致する。
    pub fn get_last(&self, n: usize) -> Vec<Message> {
        let inner = self.inner.read().expect("ring buffer lock poisoned");
        let capacity = inner.slots.len();
        let n = n.min(capacity);

        let mut result = Vec::with_capacity(n);
        for i in (0..n).rev() {
            // カーソルの1つ前が最新。そこからi件さかのぼる
            let idx = (inner.cursor + capacity - 1 - i) % capacity;
            if let Some(msg) = &inner.slots[idx] {
                result.push(msg.clone());
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn make_message(content: &str) -> Message {
        Message {
            username: "tester".to_string(),
            content: content.to_string(),
            channel: "#test".to_string(),
            tags: HashMap::new(),
            raw: String::new(),
            timestamp: Utc::now(),
            user_color: "#FFFFFF".to_string(),
        }
    }

    fn contents(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn test_partial_fill_preserves_order() {
        let buffer = RingBuffer::new(5);
        for i in 0..3 {
            buffer.add(make_message(&format!("msg{}", i)));
        }

        assert_eq!(contents(&buffer.get_all()), vec!["msg0", "msg1", "msg2"]);
    }

    #[test]
    fn test_overflow_keeps_most_recent() {
        let buffer = RingBuffer::new(3);
        for i in 0..5 {
            buffer.add(make_message(&format!("msg{}", i)));
        }

        // 容量3なので直近3件だけが残る
        assert_eq!(contents(&buffer.get_all()), vec!["msg2", "msg3", "msg4"]);
    }

    #[test]
    fn test_get_last_limits() {
        let buffer = RingBuffer::new(4);
        for i in 0..4 {
            buffer.add(make_message(&format!("msg{}", i)));
        }

        assert_eq!(contents(&buffer.get_last(2)), vec!["msg2", "msg3"]);
        // 容量超過の要求は容量件に切り詰め
        assert_eq!(buffer.get_last(100).len(), 4);
    }

    #[test]
    fn test_get_last_is_suffix_of_get_all() {
        let buffer = RingBuffer::new(8);
        for i in 0..6 {
            buffer.add(make_message(&format!("msg{}", i)));
        }

        let all = buffer.get_all();
        for n in 0..=8 {
            let last = buffer.get_last(n);
            let expected: Vec<_> = all.iter().rev().take(n).rev().cloned().collect();
            assert_eq!(contents(&last), contents(&expected));
        }
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = RingBuffer::new(4);
        assert!(buffer.get_all().is_empty());
        assert!(buffer.get_last(3).is_empty());
    }
}
