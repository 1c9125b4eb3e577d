fn main() -> prebuilt::SnafuReport<prebuilt::Error> {
    prebuilt::prebuilt_main()
}
