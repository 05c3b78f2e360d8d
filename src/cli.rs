use clap::{value_parser,crate_version,Arg,Command,ValueHint};

fn indent_arg() -> Arg {
    Arg::new("indent").long("indent").help("JSON indentation, omit to minify")
        .value_name("SPACES")
        .value_parser(value_parser!(u16).range(0..16))
        .required(false)
}

fn dimg_arg(help: &'static str) -> Arg {
    Arg::new("dimg").short('d').long("dimg").help(help)
        .value_name("PATH")
        .value_hint(ValueHint::FilePath)
        .required(true)
}

fn delta_arg(req: bool) -> Arg {
    Arg::new("delta").long("delta").help("path to delta file")
        .value_name("PATH")
        .value_hint(ValueHint::FilePath)
        .required(req)
}

pub fn build_cli() -> Command {
    let long_help = "ckdkit is always invoked with exactly one of several subcommands.
A drive is stored as a base file, optionally with a delta file holding changed tracks.
Set RUST_LOG environment variable to control logging level.
  levels: trace,debug,info,warn,error

Examples:
---------
create 3350 drive:     `ckdkit mkdsk -t 3350 -c 10 -v TESTER -d tester.ckd`
import tape dump:      `ckdkit import -i vm370.aws -d vm370.ckd`
drive summary:         `ckdkit stat -d vm370.ckd --delta vm370.delta --indent 2`
dump a track:          `ckdkit get -d vm370.ckd -c 0 --head 0`
dump a record:         `ckdkit get -d vm370.ckd -c 0 --head 0 -r 1`
merge delta:           `ckdkit commit -d vm370.ckd --delta vm370.delta -o vm370new.ckd`";

    let drive_types = ["2314","3330","3330-11","3340-35","3340-70","3350","3375","3380"];

    let mut main_cmd = Command::new("ckdkit")
        .about("Creates and inspects emulated CKD disk drives.")
        .after_long_help(long_help)
        .version(crate_version!());
    main_cmd = main_cmd.subcommand(Command::new("mkdsk")
        .arg(Arg::new("type").short('t').long("type").help("drive type")
            .value_name("TYPE")
            .value_parser(drive_types)
            .required(true))
        .arg(Arg::new("cylinders").short('c').long("cylinders").help("number of cylinders, defaults to the maximum")
            .value_name("CYLS")
            .value_parser(value_parser!(usize))
            .required(false))
        .arg(Arg::new("volume").short('v').long("volume").help("volume label, up to 6 characters")
            .value_name("VOLSER")
            .required(true))
        .arg(dimg_arg("path of the base file to create"))
        .about("write an empty drive to a new base file"));
    main_cmd = main_cmd.subcommand(Command::new("import")
        .arg(Arg::new("input").short('i').long("input").help("path to AWS tape dump")
            .value_name("PATH")
            .value_hint(ValueHint::FilePath)
            .required(true))
        .arg(dimg_arg("path of the base file to create"))
        .about("convert a tape dump of a drive into a base file"));
    main_cmd = main_cmd.subcommand(Command::new("stat")
        .arg(dimg_arg("path to base file"))
        .arg(delta_arg(false))
        .arg(indent_arg())
        .about("write drive geometry and changed tracks as JSON"));
    main_cmd = main_cmd.subcommand(Command::new("get")
        .arg(dimg_arg("path to base file"))
        .arg(delta_arg(false))
        .arg(Arg::new("cylinder").short('c').long("cylinder").help("cylinder number")
            .value_name("CYL")
            .value_parser(value_parser!(usize))
            .required(true))
        .arg(Arg::new("head").long("head").help("head number")
            .value_name("HEAD")
            .value_parser(value_parser!(usize))
            .required(true))
        .arg(Arg::new("record").short('r').long("record").help("record number, omit to dump the whole track")
            .value_name("REC")
            .value_parser(value_parser!(u8))
            .required(false))
        .about("hex dump a track or the data of one record"));
    main_cmd = main_cmd.subcommand(Command::new("commit")
        .arg(dimg_arg("path to base file"))
        .arg(delta_arg(true))
        .arg(Arg::new("output").short('o').long("output").help("path of the new base file")
            .value_name("PATH")
            .value_hint(ValueHint::FilePath)
            .required(true))
        .about("merge base and delta into a new base file"));
    main_cmd
}
