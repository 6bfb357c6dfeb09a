fn main() {
    decal_studio::decal_editor::editor::run();
}
