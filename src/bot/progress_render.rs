use crate::bot::views::failure_message;
use crate::relay::status::StatusUpdate;
use crate::relay::Provider;
use crate::utils::format_megabytes;

/// Render a status update into Telegram-ready HTML.
pub fn render_status_html(update: &StatusUpdate) -> String {
    match update {
        StatusUpdate::Processing { provider } => match provider {
            Provider::Instagram => "🔄 <b>Processing Instagram URL...</b>".to_string(),
            Provider::Terabox => "🔄 <b>Processing TeraBox URL...</b>\n\
                <i>Solving JavaScript challenge...</i>"
                .to_string(),
        },
        StatusUpdate::Downloading {
            name,
            declared_size,
            index,
            total,
        } => {
            let name = html_escape::encode_text(&crate::utils::truncate_str(name, 100)).into_owned();
            if *total > 1 {
                return format!("⏬ <b>Downloading {name} {index}/{total}...</b>");
            }
            let mut lines = vec![
                "⏬ <b>Downloading...</b>".to_string(),
                format!("📁 <b>File:</b> {name}"),
            ];
            if let Some(size) = declared_size {
                lines.push(format!(
                    "📊 <b>Size:</b> {}",
                    html_escape::encode_text(size)
                ));
            }
            lines.join("\n")
        }
        StatusUpdate::Progress {
            percent,
            transferred,
            total,
        } => format!(
            "⏬ <b>Downloading</b>... {percent:.1}%\n({} / {})",
            format_megabytes(*transferred),
            format_megabytes(*total)
        ),
        StatusUpdate::Uploading { index, total } => {
            if *total > 1 {
                format!("📤 <b>Uploading {index}/{total}...</b>")
            } else {
                "📤 <b>Uploading file...</b>".to_string()
            }
        }
        StatusUpdate::Failed(reason) => failure_message(reason),
    }
}
