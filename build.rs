fn main() {
    // Package version, target and (when building from a checkout) git commit
    built::write_built_file().expect("Failed to acquire build-time information");
}
