//! Presentation layer: turns a render context into HTML.

// self
use crate::auth::FolderId;

/// Outcome of the most recent upload, carried on `/?status=`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadStatus {
	/// The file landed in the folder.
	Uploaded,
	/// The upload was refused and retrying the same file will not help.
	Rejected,
	/// The upload failed transiently; retrying later may succeed.
	Failed,
}
impl UploadStatus {
	/// Query-string value.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Uploaded => "uploaded",
			Self::Rejected => "rejected",
			Self::Failed => "failed",
		}
	}

	/// Lenient parse; unknown values are ignored rather than rejected.
	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"uploaded" => Some(Self::Uploaded),
			"rejected" => Some(Self::Rejected),
			"failed" => Some(Self::Failed),
			_ => None,
		}
	}
}

/// Values available to the upload page.
#[derive(Clone, Debug)]
pub struct PageContext<'a> {
	/// Destination folder.
	pub folder: &'a FolderId,
	/// Banner for the previous upload.
	pub status: Option<UploadStatus>,
}

/// Renders pages for the HTTP surface.
pub trait Renderer: Send + Sync {
	/// Upload form plus the optional status banner.
	fn page(&self, ctx: &PageContext) -> String;

	/// Error page with a user-facing message and a link to retry.
	fn error(&self, message: &str, retry: &str) -> String;
}

/// Minimal built-in HTML.
#[derive(Debug, Default)]
pub struct BasicRenderer;
impl Renderer for BasicRenderer {
	fn page(&self, ctx: &PageContext) -> String {
		let banner = match ctx.status {
			Some(UploadStatus::Uploaded) => "<p class=\"status ok\">Upload complete.</p>",
			Some(UploadStatus::Rejected) =>
				"<p class=\"status error\">The file was rejected. Choose a non-empty image.</p>",
			Some(UploadStatus::Failed) =>
				"<p class=\"status error\">Upload failed, please try again later.</p>",
			None => "",
		};

		format!(
			"<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Upload</title></head><body>\n\
			 <h1>Upload an image</h1>\n{banner}\n\
			 <form action=\"/upload\" method=\"post\" enctype=\"multipart/form-data\">\n\
			 <input type=\"file\" name=\"file\" accept=\"image/*\" required>\n\
			 <button type=\"submit\">Upload</button>\n</form>\n\
			 <p>Destination folder: <code>{}</code></p>\n\
			 <form action=\"/logout\" method=\"post\"><button type=\"submit\">Sign out</button></form>\n\
			 </body></html>\n",
			escape(ctx.folder.as_ref())
		)
	}

	fn error(&self, message: &str, retry: &str) -> String {
		format!(
			"<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Error</title></head><body>\n\
			 <p>{}</p>\n<p><a href=\"{}\">Retry</a></p>\n</body></html>\n",
			escape(message),
			escape(retry)
		)
	}
}

fn escape(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());

	for c in raw.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&quot;"),
			'\'' => out.push_str("&#39;"),
			c => out.push(c),
		}
	}

	out
}
