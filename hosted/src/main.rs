//! Host-side shell: a thin REPL that mounts (or formats) a file-backed
//! image and drives it through `aios_fs::Filesystem`. The interactive
//! surface is a convenience wrapper around the core; it carries none of
//! the filesystem semantics itself.

use std::env;
use std::io::{self, Read, Write};

use aios_block_file::FileBackend;
use aios_fs::{path, Filesystem};

const DEFAULT_IMAGE: &str = "fs_image.img";
const DEFAULT_BLOCKS: u32 = 1024;
const DEFAULT_BLOCK_SIZE: u32 = 4096;
const DEFAULT_INODES: u32 = 256;

struct Shell {
    fs: Option<Filesystem<FileBackend>>,
    image: String,
    cwd: String,
}

impl Shell {
    fn new(image: String) -> Self {
        Self {
            fs: None,
            image,
            cwd: String::from("/"),
        }
    }

    fn ensure_mounted(&mut self) -> bool {
        if self.fs.is_some() {
            return true;
        }
        if let Ok(dev) = FileBackend::open(&self.image, DEFAULT_BLOCK_SIZE) {
            if let Ok(fs) = Filesystem::mount(dev) {
                self.fs = Some(fs);
                self.cwd = String::from("/");
                return true;
            }
        }
        println!("No filesystem found on {}, creating one...", self.image);
        match FileBackend::create(&self.image, DEFAULT_BLOCK_SIZE, DEFAULT_BLOCKS) {
            Ok(dev) => match Filesystem::format(dev, DEFAULT_INODES) {
                Ok(fs) => {
                    self.fs = Some(fs);
                    self.cwd = String::from("/");
                    true
                }
                Err(_) => false,
            },
            Err(_) => false,
        }
    }

    fn resolve(&self, arg: &str) -> String {
        path::normalize(&self.cwd, arg)
    }

    fn cmd_list(&mut self, arg: Option<&str>) {
        if !self.ensure_mounted() {
            return;
        }
        let abs = self.resolve(arg.unwrap_or("."));
        let fs = self.fs.as_mut().unwrap();
        match fs.list_dir(fs.root_inode(), &abs) {
            Ok(entries) => {
                for entry in entries {
                    let kind = if entry.kind == aios_fs::inode::INODE_DIR {
                        "[dir]"
                    } else {
                        "[file]"
                    };
                    println!("{kind}\t{}", entry.name_str());
                }
            }
            Err(_) => println!("list: failed"),
        }
    }

    fn cmd_mkdir(&mut self, arg: Option<&str>) {
        let Some(arg) = arg else {
            println!("make-dir: missing path");
            return;
        };
        if !self.ensure_mounted() {
            return;
        }
        let abs = self.resolve(arg);
        let fs = self.fs.as_mut().unwrap();
        if fs.make_dir(fs.root_inode(), &abs).is_err() {
            println!("make-dir: failed");
        }
    }

    fn cmd_delete(&mut self, arg: Option<&str>) {
        let Some(arg) = arg else {
            println!("delete: missing path");
            return;
        };
        if !self.ensure_mounted() {
            return;
        }
        let abs = self.resolve(arg);
        let fs = self.fs.as_mut().unwrap();
        if fs.delete(fs.root_inode(), &abs).is_err() {
            println!("delete: failed (directory not empty or not found)");
        }
    }

    fn cmd_write(&mut self, arg: Option<&str>) {
        let Some(arg) = arg else {
            println!("write: missing path");
            return;
        };
        if !self.ensure_mounted() {
            return;
        }
        let abs = self.resolve(arg);
        let fs = self.fs.as_mut().unwrap();
        let root = fs.root_inode();

        let needs_create = match fs.lookup(root, &abs) {
            Ok((_, node)) => !node.is_file(),
            Err(_) => true,
        };
        if needs_create && fs.create_file(root, &abs).is_err() {
            println!("write: failed to create file");
            return;
        }

        println!("Enter content, end with Ctrl-D (EOF):");
        let mut buf = Vec::new();
        if io::stdin().read_to_end(&mut buf).is_err() {
            println!("write: failed to read stdin");
            return;
        }
        if fs.write_file(root, &abs, &buf, 0).is_err() {
            println!("write: failed to write data");
        }
    }

    fn cmd_read(&mut self, arg: Option<&str>) {
        let Some(arg) = arg else {
            println!("read: missing path");
            return;
        };
        if !self.ensure_mounted() {
            return;
        }
        let abs = self.resolve(arg);
        let fs = self.fs.as_mut().unwrap();
        let root = fs.root_inode();

        let node = match fs.lookup(root, &abs) {
            Ok((_, node)) if node.is_file() => node,
            _ => {
                println!("read: not found or not a file");
                return;
            }
        };

        let mut buf = vec![0u8; node.size as usize];
        match fs.read_file(root, &abs, 0, &mut buf) {
            Ok(got) => {
                let stdout = io::stdout();
                let mut lock = stdout.lock();
                let _ = lock.write_all(&buf[..got]);
                if got == 0 || buf[got - 1] != b'\n' {
                    let _ = lock.write_all(b"\n");
                }
            }
            Err(_) => println!("read: failed"),
        }
    }

    fn cmd_cd(&mut self, arg: Option<&str>) {
        let Some(arg) = arg else {
            println!("cd: missing path");
            return;
        };
        if !self.ensure_mounted() {
            return;
        }
        let abs = self.resolve(arg);
        let fs = self.fs.as_mut().unwrap();
        match fs.lookup(fs.root_inode(), &abs) {
            Ok((_, node)) if node.is_dir() => self.cwd = abs,
            _ => println!("cd: not found or not a directory"),
        }
    }

    fn cmd_pwd(&mut self) {
        if !self.ensure_mounted() {
            return;
        }
        println!("{}", self.cwd);
    }

    fn cmd_format(&mut self) {
        print!("Format will destroy all data on {}. Continue? (yes/no): ", self.image);
        let _ = io::stdout().flush();
        let mut reply = String::new();
        if io::stdin().read_line(&mut reply).is_err() {
            return;
        }
        if reply.trim_end() != "yes" {
            println!("format cancelled");
            return;
        }

        self.fs.take();
        match FileBackend::create(&self.image, DEFAULT_BLOCK_SIZE, DEFAULT_BLOCKS) {
            Ok(dev) => match Filesystem::format(dev, DEFAULT_INODES) {
                Ok(fs) => {
                    self.fs = Some(fs);
                    self.cwd = String::from("/");
                }
                Err(_) => println!("format: failed"),
            },
            Err(_) => println!("format: failed"),
        }
    }

    fn cmd_mount(&mut self, arg: Option<&str>) {
        let Some(arg) = arg else {
            println!("mount: missing image path");
            return;
        };
        self.fs.take();
        self.image = arg.to_string();
        if !self.ensure_mounted() {
            println!("mount: failed");
        }
    }

    fn dispatch(&mut self, line: &str) -> bool {
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else {
            return true;
        };
        let arg = parts.next();

        match cmd {
            "help" => print_help(),
            "list" => self.cmd_list(arg),
            "make-dir" => self.cmd_mkdir(arg),
            "delete" => self.cmd_delete(arg),
            "read" => self.cmd_read(arg),
            "write" => self.cmd_write(arg),
            "cd" => self.cmd_cd(arg),
            "pwd" => self.cmd_pwd(),
            "format" => self.cmd_format(),
            "mount" => self.cmd_mount(arg),
            "exit" | "quit" => return false,
            _ => println!("Unknown command. Type 'help'."),
        }
        true
    }
}

fn print_help() {
    println!("Commands:");
    println!("  list [path]      - list directory contents");
    println!("  make-dir <path>  - create directory");
    println!("  delete <path>    - delete file or empty directory");
    println!("  read <path>      - display file contents");
    println!("  write <path>     - create/truncate file and read content from stdin (end with Ctrl-D)");
    println!("  cd <path>        - change directory");
    println!("  pwd              - print working directory");
    println!("  format           - format current image (destructive)");
    println!("  mount <image>    - mount a different image (formats if missing)");
    println!("  help             - show this help");
    println!("  exit             - quit shell");
}

fn main() {
    let image = env::args().nth(1).unwrap_or_else(|| DEFAULT_IMAGE.to_string());
    let mut shell = Shell::new(image);

    println!("AIOS toy filesystem shell. Using image {}", shell.image);
    print_help();

    loop {
        print!("aios-fs:{}> ", shell.cwd);
        let _ = io::stdout().flush();

        let mut line = String::new();
        if io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
            println!();
            break;
        }

        if !shell.dispatch(line.trim_end_matches('\n')) {
            break;
        }
    }
}
