use std::io::Write;

use crate::core::error::Result;
use crate::core::model::Completion;
use crate::interfaces::CompletionSink;

/// 将运行结果以单行 JSON 写入标准输出
pub struct StdoutCompletion;

impl CompletionSink for StdoutCompletion {
    fn done(self, completion: Completion) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        serde_json::to_writer(&mut stdout, &completion)?;
        writeln!(stdout)?;
        stdout.flush()?;
        Ok(())
    }
}
