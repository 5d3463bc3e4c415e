fn main() {
    sensing_pipeline::cli::run();
}
