// build.rs
fn main() {
    // Run `git describe --dirty` to get the description
    build_utils::git_description();
}
