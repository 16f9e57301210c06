//! Fixed editorial instructions and user-content framing.

use crate::chunker::Chunk;

/// Editorial instruction set sent as the system message (or `instructions`).
pub const SYSTEM_PROMPT: &str = "このGPTは、編集者の視点から日本語文書を推敲し、改善を提案します。
特に、誤字脱字、変換ミス、表記ミスに注目し、数字やアルファベットの表記が半角で統一されているかを確認します。文章表現の技巧にはあまり踏み込まず、かなやアルファベットで複数回出てくる固有名詞の表記揺れ、削除可能な指示代名詞、同じ文頭や文末表現が連続する部分、同音異義語の誤用を指摘します。読みやすさについても評価してください。
指摘は具体的に、何行目のどの部分に関するものかを、文章の形で示します。
文書が「■」で区切られている場合、区切りごとに内容を要約し、全体の構成が妥当で論理的かを評価します。指摘や提案は、アップロードされた文書の中に含まれる内容に限定して行います。
全ての返答は日本語で行います。
チェック後には、修正部分を【修正前→修正後】の形式で示してください。

返答は以下の構造で行ってください：

## 【校正結果】

### 1. 誤字・脱字・表記ミス
（該当箇所を「○行目：〜」の形式で列挙。なければ「指摘なし」）

### 2. 表記の統一（固有名詞・数字・アルファベット）
（該当箇所を列挙。なければ「指摘なし」）

### 3. 文章表現・読みやすさ
（指示代名詞・連続する文頭/文末・同音異義語などを列挙。なければ「指摘なし」）

### 4. 構成・論理性の評価
（「■」区切りがある場合は各セクションを要約し評価。ない場合は全体を評価）

### 5. 総評
（文書全体の品質について簡潔に総評）";

/// Visible divider between per-block sections of an aggregate result.
pub const BLOCK_DIVIDER: &str = "\n\n────────────────────\n\n";

/// User content for a whole-document delivery.
pub fn document_message(text: &str) -> String {
    format!("以下の文書を校正してください。\n\n---\n{text}\n---")
}

/// User content for one block of a split document. The positional framing
/// lets each block's critique be told apart in the aggregate.
pub fn chunk_message(chunk: &Chunk) -> String {
    format!(
        "これは長い文書を分割した第{index}部（全{total}部）です。この部分のみを校正してください。\n\n---\n{text}\n---",
        index = chunk.index,
        total = chunk.total,
        text = chunk.text
    )
}

/// Heading placed above one block's result in the aggregate.
pub fn block_heading(index: usize, total: usize) -> String {
    format!("## ブロック {index} / {total} の校正結果")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_framing_names_position() {
        let chunk = Chunk {
            index: 2,
            total: 3,
            text: "本文".to_string(),
        };
        let msg = chunk_message(&chunk);
        assert!(msg.contains("第2部（全3部）"), "got: {msg}");
        assert!(msg.ends_with("---\n本文\n---"));
    }

    #[test]
    fn document_framing_wraps_text() {
        assert_eq!(
            document_message("Hello."),
            "以下の文書を校正してください。\n\n---\nHello.\n---"
        );
    }
}
