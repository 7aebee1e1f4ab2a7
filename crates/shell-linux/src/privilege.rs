/// True when running as root, which installing a systemd unit requires.
pub fn is_root() -> bool {
    nix::unistd::Uid::effective().is_root()
}
