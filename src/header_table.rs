//! ヘッダーテーブル
//!
//! 名前の大文字小文字を区別しない、追記中心のヘッダー格納領域。
//! 受信順を保持し、同名ヘッダーの重複も許可する。

/// ヘッダーテーブル
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderTable {
    entries: Vec<(String, String)>,
}

impl HeaderTable {
    /// 初期容量を指定してテーブルを作成
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// ヘッダーを追加 (同名ヘッダーがあっても置き換えない)
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// ヘッダーを設定 (同名ヘッダーはすべて置き換える)
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    /// ヘッダーを取得 (大文字小文字を区別しない)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// 指定した名前のヘッダーをすべて取得
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// ヘッダーが存在するか確認
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// 指定した名前のヘッダーをすべて削除し、削除した数を返す
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 受信順にヘッダーを走査
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// すべてのヘッダーを削除 (確保済みの容量は保持する)
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Connection ヘッダーのトークンをすべて取得
    ///
    /// RFC 9110 Section 7.6.1: 複数の Connection ヘッダーはリストとして結合して扱う。
    pub fn connection_tokens(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("Connection"))
            .flat_map(|(_, v)| v.split(','))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}
