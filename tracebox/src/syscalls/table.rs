//! The canonical-to-native syscall number table.
//!
//! Row format: canonical id, kernel name, then one bracket of native numbers
//! per ABI column in table order (x86, x86_64, x32, arm EABI, FreeBSD amd64,
//! arm64). x32 entries are stored without the `__X32_SYSCALL_BIT`; compat
//! calls use their 512-range numbers. Variants that differ only in argument
//! width share a row with their base call (`mmap`/`mmap2`, `getuid`/
//! `getuid32`, `fcntl`/`fcntl64`, time64 forms) since they share a policy.

use crate::abi::ABI_COUNT;

macro_rules! syscall_table {
    (
        $(
            $variant:ident, $name:literal =>
                $x86:tt $x64:tt $x32:tt $arm:tt $fbsd:tt $a64:tt;
        )+
    ) => {
        /// Portable identifier for a logical kernel operation.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[derive(serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        #[repr(usize)]
        pub enum Syscall {
            $($variant,)+
        }

        impl Syscall {
            /// Every canonical id, in table-row order.
            pub const ALL: &'static [Syscall] = &[$(Syscall::$variant,)+];

            /// Number of canonical ids.
            pub const COUNT: usize = Self::ALL.len();

            /// The lowercase kernel name of the call.
            pub fn name(self) -> &'static str {
                match self {
                    $(Syscall::$variant => $name,)+
                }
            }
        }

        /// `TRANSLATOR[canonical][abi_index]` is the set of native numbers
        /// invoking `canonical` on that ABI.
        pub(crate) static TRANSLATOR: [[&[u32]; ABI_COUNT]; Syscall::COUNT] = [
            $([&$x86, &$x64, &$x32, &$arm, &$fbsd, &$a64],)+
        ];
    };
}

syscall_table! {
    //                          x86         x86_64      x32         arm         freebsd     arm64
    RestartSyscall, "restart_syscall" =>
                                [0]         [219]       [219]       [0]         []          [128];
    Exit, "exit" =>             [1]         [60]        [60]        [1]         [1]         [93];
    Fork, "fork" =>             [2]         [57]        [57]        [2]         [2]         [];
    Read, "read" =>             [3]         [0]         [0]         [3]         [3]         [63];
    Write, "write" =>           [4]         [1]         [1]         [4]         [4]         [64];
    Open, "open" =>             [5]         [2]         [2]         [5]         [5]         [];
    Close, "close" =>           [6]         [3]         [3]         [6]         [6]         [57];
    Creat, "creat" =>           [8]         [85]        [85]        [8]         []          [];
    Unlink, "unlink" =>         [10]        [87]        [87]        [10]        [10]        [];
    Execve, "execve" =>         [11]        [59]        [520]       [11]        [59]        [221];
    Chdir, "chdir" =>           [12]        [80]        [80]        [12]        [12]        [49];
    Time, "time" =>             [13]        [201]       [201]       []          []          [];
    Chmod, "chmod" =>           [15]        [90]        [90]        [15]        [15]        [];
    Lseek, "lseek" =>           [19, 140]   [8]         [8]         [19]        [478]       [62];
    Getpid, "getpid" =>         [20]        [39]        [39]        [20]        [20]        [172];
    Setuid, "setuid" =>         [23, 213]   [105]       [105]       [23, 213]   [23]        [146];
    Getuid, "getuid" =>         [24, 199]   [102]       [102]       [24, 199]   [24]        [174];
    Ptrace, "ptrace" =>         [26]        [101]       [521]       [26]        [26]        [117];
    Alarm, "alarm" =>           [27]        [37]        [37]        []          []          [];
    Pause, "pause" =>           [29]        [34]        [34]        [29]        []          [];
    Access, "access" =>         [33]        [21]        [21]        [33]        [33]        [];
    Sync, "sync" =>             [36]        [162]       [162]       [36]        [36]        [81];
    Kill, "kill" =>             [37]        [62]        [62]        [37]        [37]        [129];
    Rename, "rename" =>         [38]        [82]        [82]        [38]        [128]       [];
    Mkdir, "mkdir" =>           [39]        [83]        [83]        [39]        [136]       [];
    Rmdir, "rmdir" =>           [40]        [84]        [84]        [40]        [137]       [];
    Dup, "dup" =>               [41]        [32]        [32]        [41]        [41]        [23];
    Pipe, "pipe" =>             [42]        [22]        [22]        [42]        [42]        [];
    Times, "times" =>           [43]        [100]       [100]       [43]        []          [153];
    Brk, "brk" =>               [45]        [12]        [12]        [45]        [17]        [214];
    Setgid, "setgid" =>         [46, 214]   [106]       [106]       [46, 214]   [181]       [144];
    Getgid, "getgid" =>         [47, 200]   [104]       [104]       [47, 200]   [47]        [176];
    Geteuid, "geteuid" =>       [49, 201]   [107]       [107]       [49, 201]   [25]        [175];
    Getegid, "getegid" =>       [50, 202]   [108]       [108]       [50, 202]   [43]        [177];
    Ioctl, "ioctl" =>           [54]        [16]        [514]       [54]        [54]        [29];
    Fcntl, "fcntl" =>           [55, 221]   [72]        [72]        [55, 221]   [92]        [25];
    Setpgid, "setpgid" =>       [57]        [109]       [109]       [57]        [82]        [154];
    Umask, "umask" =>           [60]        [95]        [95]        [60]        [60]        [166];
    Dup2, "dup2" =>             [63]        [33]        [33]        [63]        [90]        [];
    Getppid, "getppid" =>       [64]        [110]       [110]       [64]        [39]        [173];
    Getpgrp, "getpgrp" =>       [65]        [111]       [111]       [65]        [81]        [];
    Setsid, "setsid" =>         [66]        [112]       [112]       [66]        [147]       [157];
    Setreuid, "setreuid" =>     [70, 203]   [113]       [113]       [70, 203]   [126]       [145];
    Setregid, "setregid" =>     [71, 204]   [114]       [114]       [71, 204]   [127]       [143];
    Setrlimit, "setrlimit" =>   [75]        [160]       [160]       [75]        [195]       [164];
    Getrlimit, "getrlimit" =>   [76, 191]   [97]        [97]        [191]       [194]       [163];
    Getrusage, "getrusage" =>   [77]        [98]        [98]        [77]        [117]       [165];
    Gettimeofday, "gettimeofday" =>
                                [78]        [96]        [96]        [78]        [116]       [169];
    Getgroups, "getgroups" =>   [80, 205]   [115]       [115]       [80, 205]   [79]        [158];
    Symlink, "symlink" =>       [83]        [88]        [88]        [83]        [57]        [];
    Readlink, "readlink" =>     [85]        [89]        [89]        [85]        [58]        [];
    Mmap, "mmap" =>             [90, 192]   [9]         [9]         [192]       [477]       [222];
    Munmap, "munmap" =>         [91]        [11]        [11]        [91]        [73]        [215];
    Truncate, "truncate" =>     [92, 193]   [76]        [76]        [92, 193]   [479]       [45];
    Ftruncate, "ftruncate" =>   [93, 194]   [77]        [77]        [93, 194]   [480]       [46];
    Fchmod, "fchmod" =>         [94]        [91]        [91]        [94]        [124]       [52];
    Getpriority, "getpriority" =>
                                [96]        [140]       [140]       [96]        [100]       [141];
    Setpriority, "setpriority" =>
                                [97]        [141]       [141]       [97]        [96]        [140];
    Statfs, "statfs" =>         [99, 268]   [137]       [137]       [99, 266]   [396]       [43];
    Fstatfs, "fstatfs" =>       [100, 269]  [138]       [138]       [100, 267]  [397]       [44];
    Socketcall, "socketcall" => [102]       []          []          [102]       []          [];
    Setitimer, "setitimer" =>   [104]       [38]        [38]        [104]       [83]        [103];
    Getitimer, "getitimer" =>   [105]       [36]        [36]        [105]       [86]        [102];
    Stat, "stat" =>             [106, 195]  [4]         [4]         [106, 195]  [188]       [];
    Lstat, "lstat" =>           [107, 196]  [6]         [6]         [107, 196]  [190]       [];
    Fstat, "fstat" =>           [108, 197]  [5]         [5]         [108, 197]  [189]       [80];
    Wait4, "wait4" =>           [114]       [61]        [61]        [114]       [7]         [260];
    Sysinfo, "sysinfo" =>       [116]       [99]        [99]        [116]       []          [179];
    Fsync, "fsync" =>           [118]       [74]        [74]        [118]       [95]        [82];
    Sigreturn, "sigreturn" =>   [119]       []          []          [119]       [417]       [];
    Clone, "clone" =>           [120]       [56]        [56]        [120]       []          [220];
    Uname, "uname" =>           [122]       [63]        [63]        [122]       []          [160];
    ModifyLdt, "modify_ldt" =>  [123]       [154]       [154]       []          []          [];
    Mprotect, "mprotect" =>     [125]       [10]        [10]        [125]       [74]        [226];
    Getpgid, "getpgid" =>       [132]       [121]       [121]       [132]       [207]       [155];
    Fchdir, "fchdir" =>         [133]       [81]        [81]        [133]       [13]        [50];
    Personality, "personality" =>
                                [136]       [135]       [135]       [136]       []          [92];
    Getdents, "getdents" =>     [141, 220]  [78, 217]   [78, 217]   [141, 217]  [272]       [61];
    Select, "select" =>         [82, 142]   [23]        [23]        [142]       [93]        [];
    Flock, "flock" =>           [143]       [73]        [73]        [143]       [131]       [32];
    Msync, "msync" =>           [144]       [26]        [26]        [144]       [65]        [227];
    Readv, "readv" =>           [145]       [19]        [515]       [145]       [120]       [65];
    Writev, "writev" =>         [146]       [20]        [516]       [146]       [121]       [66];
    Getsid, "getsid" =>         [147]       [124]       [124]       [147]       [310]       [156];
    Fdatasync, "fdatasync" =>   [148]       [75]        [75]        [148]       [550]       [83];
    Mlock, "mlock" =>           [150]       [149]       [149]       [150]       [203]       [228];
    Munlock, "munlock" =>       [151]       [150]       [150]       [151]       [204]       [229];
    Mlockall, "mlockall" =>     [152]       [151]       [151]       [152]       [324]       [230];
    Munlockall, "munlockall" => [153]       [152]       [152]       [153]       [325]       [231];
    SchedSetparam, "sched_setparam" =>
                                [154]       [142]       [142]       [154]       []          [118];
    SchedGetparam, "sched_getparam" =>
                                [155]       [143]       [143]       [155]       []          [121];
    SchedSetscheduler, "sched_setscheduler" =>
                                [156]       [144]       [144]       [156]       []          [119];
    SchedGetscheduler, "sched_getscheduler" =>
                                [157]       [145]       [145]       [157]       []          [120];
    SchedYield, "sched_yield" =>
                                [158]       [24]        [24]        [158]       [331]       [124];
    SchedGetPriorityMax, "sched_get_priority_max" =>
                                [159]       [146]       [146]       [159]       []          [125];
    SchedGetPriorityMin, "sched_get_priority_min" =>
                                [160]       [147]       [147]       [160]       []          [126];
    SchedRrGetInterval, "sched_rr_get_interval" =>
                                [161]       [148]       [148]       [161]       []          [127];
    Nanosleep, "nanosleep" =>   [162]       [35]        [35]        [162]       [240]       [101];
    Mremap, "mremap" =>         [163]       [25]        [25]        [163]       []          [216];
    Setresuid, "setresuid" =>   [164, 208]  [117]       [117]       [164, 208]  [311]       [147];
    Getresuid, "getresuid" =>   [165, 209]  [118]       [118]       [165, 209]  [360]       [148];
    Poll, "poll" =>             [168]       [7]         [7]         [168]       [209]       [];
    Setresgid, "setresgid" =>   [170, 210]  [119]       [119]       [170, 210]  [312]       [149];
    Getresgid, "getresgid" =>   [171, 211]  [120]       [120]       [171, 211]  [361]       [150];
    Prctl, "prctl" =>           [172]       [157]       [157]       [172]       []          [167];
    RtSigreturn, "rt_sigreturn" =>
                                [173]       [15]        [513]       [173]       []          [139];
    RtSigaction, "rt_sigaction" =>
                                [174]       [13]        [512]       [174]       [416]       [134];
    RtSigprocmask, "rt_sigprocmask" =>
                                [175]       [14]        [14]        [175]       [340]       [135];
    RtSigpending, "rt_sigpending" =>
                                [176]       [127]       [522]       [176]       []          [136];
    RtSigtimedwait, "rt_sigtimedwait" =>
                                [177]       [128]       [523]       [177]       [345]       [137];
    RtSigsuspend, "rt_sigsuspend" =>
                                [179]       [130]       [130]       [179]       [341]       [133];
    Pread64, "pread64" =>       [180]       [17]        [17]        [180]       [475]       [67];
    Pwrite64, "pwrite64" =>     [181]       [18]        [18]        [181]       [476]       [68];
    Getcwd, "getcwd" =>         [183]       [79]        [79]        [183]       [326]       [17];
    Sigaltstack, "sigaltstack" =>
                                [186]       [131]       [525]       [186]       [53]        [132];
    Sendfile, "sendfile" =>     [187, 239]  [40]        [40]        [187, 239]  [393]       [71];
    Vfork, "vfork" =>           [190]       [58]        [58]        [190]       [66]        [];
    Mincore, "mincore" =>       [218]       [27]        [27]        [219]       [78]        [232];
    Madvise, "madvise" =>       [219]       [28]        [28]        [220]       [75]        [233];
    Gettid, "gettid" =>         [224]       [186]       [186]       [224]       []          [178];
    Futex, "futex" =>           [240, 422]  [202]       [202]       [240, 422]  []          [98];
    SchedSetaffinity, "sched_setaffinity" =>
                                [241]       [203]       [203]       [241]       []          [122];
    SchedGetaffinity, "sched_getaffinity" =>
                                [242]       [204]       [204]       [242]       [487]       [123];
    SetThreadArea, "set_thread_area" =>
                                [243]       [205]       []          []          []          [];
    GetThreadArea, "get_thread_area" =>
                                [244]       [211]       []          []          []          [];
    ExitGroup, "exit_group" =>  [252]       [231]       [231]       [248]       []          [94];
    EpollCreate, "epoll_create" =>
                                [254, 329]  [213, 291]  [213, 291]  [250, 357]  []          [20];
    EpollCtl, "epoll_ctl" =>    [255]       [233]       [233]       [251]       []          [21];
    EpollWait, "epoll_wait" =>  [256, 319]  [232, 281]  [232, 281]  [252, 346]  []          [22];
    SetTidAddress, "set_tid_address" =>
                                [258]       [218]       [218]       [256]       []          [96];
    ClockSettime, "clock_settime" =>
                                [264]       [227]       [227]       [262]       [233]       [112];
    ClockGettime, "clock_gettime" =>
                                [265, 403]  [228]       [228]       [263, 403]  [232]       [113];
    ClockGetres, "clock_getres" =>
                                [266, 406]  [229]       [229]       [264, 406]  [234]       [114];
    ClockNanosleep, "clock_nanosleep" =>
                                [267, 407]  [230]       [230]       [265, 407]  [244]       [115];
    Tgkill, "tgkill" =>         [270]       [234]       [234]       [268]       []          [131];
    Fadvise64, "fadvise64" =>   [250, 272]  [221]       [221]       [270]       [531]       [223];
    Waitid, "waitid" =>         [284]       [247]       [529]       [280]       []          [95];
    Openat, "openat" =>         [295]       [257]       [257]       [322]       [499]       [56];
    Mkdirat, "mkdirat" =>       [296]       [258]       [258]       [323]       [496]       [34];
    Fstatat, "fstatat" =>       [300]       [262]       [262]       [327]       [552]       [79];
    Unlinkat, "unlinkat" =>     [301]       [263]       [263]       [328]       [503]       [35];
    Renameat, "renameat" =>     [302, 353]  [264, 316]  [264, 316]  [329, 382]  [501]       [38, 276];
    Linkat, "linkat" =>         [303]       [265]       [265]       [330]       [495]       [37];
    Symlinkat, "symlinkat" =>   [304]       [266]       [266]       [331]       [502]       [36];
    Readlinkat, "readlinkat" => [305]       [267]       [267]       [332]       [500]       [78];
    Fchmodat, "fchmodat" =>     [306]       [268]       [268]       [333]       [490]       [53];
    Faccessat, "faccessat" =>   [307, 439]  [269, 439]  [269, 439]  [334, 439]  [489]       [48, 439];
    Pselect6, "pselect6" =>     [308, 413]  [270]       [270]       [335, 413]  []          [72];
    Ppoll, "ppoll" =>           [309, 414]  [271]       [271]       [336, 414]  []          [73];
    SetRobustList, "set_robust_list" =>
                                [311]       [273]       [530]       [338]       []          [99];
    GetRobustList, "get_robust_list" =>
                                [312]       [274]       [531]       [339]       []          [100];
    Splice, "splice" =>         [313]       [275]       [275]       [340]       []          [76];
    Tee, "tee" =>               [315]       [276]       [276]       [342]       []          [77];
    Vmsplice, "vmsplice" =>     [316]       [278]       [532]       [343]       []          [75];
    Getcpu, "getcpu" =>         [318]       [309]       [309]       [345]       []          [168];
    Eventfd, "eventfd" =>       [323, 328]  [284, 290]  [284, 290]  [351, 356]  []          [19];
    Dup3, "dup3" =>             [330]       [292]       [292]       [358]       []          [24];
    Pipe2, "pipe2" =>           [331]       [293]       [293]       [359]       [542]       [59];
    Preadv, "preadv" =>         [333]       [295]       [534]       [361]       [289]       [69];
    Pwritev, "pwritev" =>       [334]       [296]       [535]       [362]       [290]       [70];
    Prlimit64, "prlimit64" =>   [340]       [302]       [302]       [369]       []          [261];
    Getrandom, "getrandom" =>   [355]       [318]       [318]       [384]       [563]       [278];
    MemfdCreate, "memfd_create" =>
                                [356]       [319]       [319]       [385]       []          [279];
    Execveat, "execveat" =>     [358]       [322]       [545]       [387]       []          [281];
    Socket, "socket" =>         [359]       [41]        [41]        [281]       [97]        [198];
    Socketpair, "socketpair" => [360]       [53]        [53]        [288]       [135]       [199];
    Bind, "bind" =>             [361]       [49]        [49]        [282]       [104]       [200];
    Connect, "connect" =>       [362]       [42]        [42]        [283]       [98]        [203];
    Listen, "listen" =>         [363]       [50]        [50]        [284]       [106]       [201];
    Accept, "accept" =>         [364]       [43, 288]   [43, 288]   [285, 366]  [30, 541]   [202, 242];
    Getsockopt, "getsockopt" => [365]       [55]        [542]       [295]       [118]       [209];
    Setsockopt, "setsockopt" => [366]       [54]        [541]       [294]       [105]       [208];
    Getsockname, "getsockname" =>
                                [367]       [51]        [51]        [286]       [32]        [204];
    Getpeername, "getpeername" =>
                                [368]       [52]        [52]        [287]       [31]        [205];
    Sendto, "sendto" =>         [369]       [44]        [44]        [290]       [133]       [206];
    Sendmsg, "sendmsg" =>       [370]       [46]        [518]       [296]       [28]        [211];
    Recvfrom, "recvfrom" =>     [371]       [45]        [517]       [292]       [29]        [207];
    Recvmsg, "recvmsg" =>       [372]       [47]        [519]       [297]       [27]        [212];
    Shutdown, "shutdown" =>     [373]       [48]        [48]        [293]       [134]       [210];
    Membarrier, "membarrier" => [375]       [324]       [324]       [389]       []          [283];
    CopyFileRange, "copy_file_range" =>
                                [377]       [326]       [326]       [391]       [569]       [285];
    Statx, "statx" =>           [383]       [332]       [332]       [397]       []          [291];
    ArchPrctl, "arch_prctl" =>  [384]       [158]       [158]       []          [165]       [];
    Rseq, "rseq" =>             [386]       [334]       [334]       [398]       []          [293];
    Clone3, "clone3" =>         [435]       [435]       [435]       [435]       []          [435];
    CloseRange, "close_range" =>
                                [436]       [436]       [436]       [436]       []          [436];
    Openat2, "openat2" =>       [437]       [437]       [437]       [437]       []          [437];
}
