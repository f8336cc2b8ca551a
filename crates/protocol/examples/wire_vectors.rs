//! Print wire vectors for interop testing against other client implementations.
//!
//! Run with: cargo run --package protocol --example wire_vectors

use protocol::messages::{
    Command, DownloadStatus, Listing, LoginReply, INVALID_COMMAND, PASSWORD_PROMPT,
    USERNAME_PROMPT,
};
use protocol::FrameCodec;

fn main() {
    let codec = FrameCodec::new();

    // Handshake
    print_string_vector(&codec, "username_prompt", USERNAME_PROMPT);
    print_string_vector(&codec, "password_prompt", PASSWORD_PROMPT);
    print_string_vector(&codec, "login_success", LoginReply::Success.as_token());
    print_string_vector(&codec, "login_failed", LoginReply::Failed.as_token());

    // Commands
    for command in Command::ALL {
        let name = format!("command_{}", command.as_token().to_lowercase());
        print_string_vector(&codec, &name, command.as_token());
    }
    print_string_vector(&codec, "invalid_command", INVALID_COMMAND);

    // Download replies
    print_string_vector(&codec, "file_ok", DownloadStatus::Found.as_token());
    print_string_vector(&codec, "file_not_found", DownloadStatus::NotFound.as_token());
    print_bytes_vector("size_5", &codec.encode_i64(5));

    // Listing with one text file
    let mut listing = Listing::new();
    listing.push("pdf", vec![]);
    listing.push("jpg", vec![]);
    listing.push("txt", vec!["a.txt".to_string()]);
    print_string_vector(&codec, "listing", &listing.render());
}

fn print_string_vector(codec: &FrameCodec, name: &str, value: &str) {
    let bytes = codec.encode_string(value).expect("vector exceeds string limit");
    print_bytes_vector(name, &bytes);
}

fn print_bytes_vector(name: &str, bytes: &[u8]) {
    print!("{} = [", name);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            print!(", ");
        }
        print!("{:#04x}", b);
    }
    println!("]");
}
