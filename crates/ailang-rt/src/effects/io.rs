//! IO effect handlers: print, println, readLine.
//!
//! All output goes through the context's stdout sink so the driver decides
//! whether that is the real stdout or a capture buffer.

use ailang_common::Diagnostic;

use crate::effects::EffContext;

pub fn print(ctx: &EffContext, text: &str) -> Result<(), Diagnostic> {
    ctx.require("IO")?;
    ctx.write_stdout(text)
}

pub fn println(ctx: &EffContext, text: &str) -> Result<(), Diagnostic> {
    ctx.require("IO")?;
    ctx.write_stdout(text)?;
    ctx.write_stdout("\n")
}

/// Read one line from stdin, without the trailing newline. EOF yields the
/// empty string.
pub fn read_line(ctx: &EffContext) -> Result<String, Diagnostic> {
    ctx.require("IO")?;
    ctx.read_stdin_line()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::RunEnv;
    use std::cell::RefCell;
    use std::io::Write;
    use std::rc::Rc;

    /// A write sink sharing its buffer with the test.
    #[derive(Clone, Default)]
    struct Shared(Rc<RefCell<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture_context(input: &str) -> (EffContext, Shared) {
        let shared = Shared::default();
        let ctx = EffContext::new(
            RunEnv::default(),
            Box::new(shared.clone()),
            Box::new(std::io::Cursor::new(input.as_bytes().to_vec())),
        );
        (ctx, shared)
    }

    #[test]
    fn println_requires_the_io_capability() {
        let (ctx, _) = capture_context("");
        assert!(println(&ctx, "hi").is_err());
    }

    #[test]
    fn println_appends_a_newline() {
        let (ctx, out) = capture_context("");
        ctx.grant("IO");
        println(&ctx, "hello").unwrap();
        assert_eq!(String::from_utf8(out.0.borrow().clone()).unwrap(), "hello\n");
    }

    #[test]
    fn read_line_strips_the_newline_and_handles_eof() {
        let (ctx, _) = capture_context("first\nsecond");
        ctx.grant("IO");
        assert_eq!(read_line(&ctx).unwrap(), "first");
        assert_eq!(read_line(&ctx).unwrap(), "second");
        assert_eq!(read_line(&ctx).unwrap(), "");
    }
}
