//! Overlapping fixed-window chunker
//!
//! Windows are measured in Unicode scalar values so multi-byte text never
//! splits inside a character. Each window after the first starts `overlap`
//! characters before the previous one ended.

use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    size: usize,
    overlap: usize,
}

impl TextChunker {
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            anyhow::bail!("chunk size must be greater than zero");
        }
        if overlap >= size {
            anyhow::bail!("chunk overlap ({}) must be smaller than chunk size ({})", overlap, size);
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Leading window of `text`, at most `size` characters.
    pub fn head<'a>(&self, text: &'a str) -> &'a str {
        match text.char_indices().nth(self.size) {
            Some((end, _)) => &text[..end],
            None => text,
        }
    }

    /// Split `text` into ordered windows. Whitespace-only text yields no chunks;
    /// text of at most `size` characters yields exactly one.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        // Byte offset of every char boundary, plus the end of the string.
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());
        let char_count = boundaries.len() - 1;

        if char_count <= self.size {
            return vec![text.to_string()];
        }

        let stride = self.size - self.overlap;
        let mut chunks = Vec::with_capacity(char_count / stride + 1);
        let mut start = 0;
        loop {
            let end = (start + self.size).min(char_count);
            chunks.push(text[boundaries[start]..boundaries[end]].to_string());
            if end == char_count {
                break;
            }
            start += stride;
        }
        chunks
    }

    /// Inverse of [`chunk`](Self::chunk) for chunks produced with this configuration.
    pub fn reassemble(&self, chunks: &[String]) -> String {
        let mut text = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                text.push_str(chunk);
            } else {
                text.extend(chunk.chars().skip(self.overlap));
            }
        }
        text
    }
}

/// Split `text` with the given configuration.
pub fn chunk(text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
    Ok(TextChunker::new(size, overlap)?.chunk(text))
}
