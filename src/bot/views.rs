//! Fixed user-facing texts
//!
//! Welcome/help messages and the one message each failure reason maps to.

use crate::relay::FailureReason;
use crate::utils::format_megabytes;

/// Reply to `/start`
pub const WELCOME_TEXT: &str = "🎬📸 <b>Media Relay Bot</b>\n\n\
Send me a supported link and I'll fetch the content and send it back here.\n\n\
<b>What I can relay:</b>\n\
🎥 <b>Instagram Reels</b> - video\n\
📸 <b>Instagram Posts</b> - video or photos\n\
📦 <b>TeraBox Files</b> - videos and other files\n\n\
<b>How to use:</b>\n\
1. Copy a supported link\n\
2. Send it to me\n\
3. Wait for processing ⏳\n\n\
Type /help for the list of supported links.";

/// Reply to `/help`
pub const HELP_TEXT: &str = "📖 <b>Help</b>\n\n\
<b>Commands:</b>\n\
• <code>/start</code> - Start the bot\n\
• <code>/help</code> - Show this help message\n\n\
<b>Supported links:</b>\n\n\
<b>Instagram:</b>\n\
• <code>https://instagram.com/reel/xxxxx</code>\n\
• <code>https://www.instagram.com/p/xxxxx</code>\n\n\
<b>TeraBox:</b>\n\
• <code>https://terabox.com/s/xxxxx</code>\n\
• <code>https://www.terabox.com/sharing/link?surl=xxxxx</code>\n\
• <code>https://1024tera.com/s/xxxxx</code>\n\n\
Files up to 2GB are supported. If a message has several links, Instagram \
links are processed first and only one link is handled per message.\n\n\
<i>Only public content can be fetched.</i>";

/// Reply when processing hit an internal fault
pub const GENERIC_FAILURE_TEXT: &str = "❌ <b>An error occurred while processing your request.</b>\n\n\
<i>Please try again later.</i>";

/// The fixed message for a failure reason
#[must_use]
pub fn failure_message(reason: &FailureReason) -> String {
    match reason {
        FailureReason::NoUrl => "❌ <b>No supported URL found!</b>\n\n\
            Please send a valid link from:\n\
            • <b>Instagram:</b> <code>https://instagram.com/p/xxxxx</code>\n\
            • <b>TeraBox:</b> <code>https://terabox.com/s/xxxxx</code>"
            .to_string(),
        FailureReason::ResolveFailed => "❌ <b>Failed to fetch content</b>\n\n\
            <b>Possible reasons:</b>\n\
            • Content is private or expired\n\
            • Invalid URL\n\
            • Anti-bot protection active\n\n\
            <i>Please try again later.</i>"
            .to_string(),
        FailureReason::DownloadFailed => "❌ <b>Failed to download file</b>".to_string(),
        FailureReason::TooLarge { size, limit } => format!(
            "❌ <b>File too large!</b>\n\n<b>File size:</b> {}\n<b>Maximum allowed:</b> {}",
            format_megabytes(*size),
            format_megabytes(*limit)
        ),
        FailureReason::UploadFailed => "❌ <b>Failed to upload file</b>\n\n\
            <i>Please try again later.</i>"
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_large_shows_sizes() {
        let text = failure_message(&FailureReason::TooLarge {
            size: 3 * 1024 * 1024,
            limit: 2 * 1024 * 1024,
        });
        assert!(text.contains("3.0MB"));
        assert!(text.contains("2.0MB"));
    }

    #[test]
    fn test_each_reason_has_fixed_text() {
        assert!(failure_message(&FailureReason::NoUrl).contains("No supported URL"));
        assert_eq!(
            failure_message(&FailureReason::ResolveFailed),
            failure_message(&FailureReason::ResolveFailed)
        );
        assert!(failure_message(&FailureReason::ResolveFailed).contains("Failed to fetch"));
    }

    #[test]
    fn test_help_lists_every_link_form() {
        for form in ["/reel/", "/p/", "terabox.com/s/", "surl=", "1024tera.com/s/"] {
            assert!(HELP_TEXT.contains(form), "{form}");
        }
    }
}
