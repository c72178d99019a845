//! 通用常量.

/// 组织标签像素值.
pub mod label {
    /// 空气 / 背景.
    pub const AIR: u8 = 0;

    /// 脂肪 (尚未区分皮下/肌间).
    pub const FAT: u8 = 1;

    /// 肌肉.
    pub const MUSCLE: u8 = 2;

    /// 松质骨 (低密度骨).
    pub const TRAB_BONE: u8 = 3;

    /// 皮质骨.
    pub const CORT_BONE: u8 = 4;

    /// 高密度皮质骨.
    pub const H_CORT_BONE: u8 = 5;

    /// 骨髓 (骨内部孔洞).
    pub const BONE_MARROW: u8 = 6;

    /// 皮下脂肪.
    pub const SUB_FAT: u8 = 7;

    /// 肌间脂肪.
    pub const IM_FAT: u8 = 8;

    /// 4% 部位的整体骨区域.
    pub const BONE_4PCT: u8 = 9;

    /// 4% 骨区域最内侧 50% 面积.
    pub const BONE_4PCT_50PCT: u8 = 10;

    /// 4% 骨区域最内侧 10% 面积.
    pub const BONE_4PCT_10PCT: u8 = 11;

    /// 前景总截面.
    pub const TOT_AREA: u8 = 12;

    /// 像素是否是空气?
    #[inline]
    pub const fn is_air(p: u8) -> bool {
        matches!(p, AIR)
    }

    /// 像素是否是 (未细分的) 脂肪?
    #[inline]
    pub const fn is_fat(p: u8) -> bool {
        matches!(p, FAT)
    }

    /// 像素是否是肌肉?
    #[inline]
    pub const fn is_muscle(p: u8) -> bool {
        matches!(p, MUSCLE)
    }

    /// 像素是否是肌肉或肌间脂肪? 二次重聚类的取样范围.
    #[inline]
    pub const fn is_muscle_or_imfat(p: u8) -> bool {
        matches!(p, MUSCLE | IM_FAT)
    }

    /// 像素是否属于骨 (皮质骨, 高密度皮质骨或骨髓)?
    #[inline]
    pub const fn is_bone(p: u8) -> bool {
        matches!(p, CORT_BONE | H_CORT_BONE | BONE_MARROW)
    }

    /// 像素是否是非空气前景?
    #[inline]
    pub const fn is_foreground(p: u8) -> bool {
        !is_air(p)
    }

    /// 像素是否是脂肪或肌肉? GAC 脂肪分离策略的改写范围.
    #[inline]
    pub const fn is_fat_or_muscle(p: u8) -> bool {
        matches!(p, FAT | MUSCLE)
    }
}

/// 组织类型. 与 [`label`] 中的像素值一一对应.
///
/// 栅格存储沿用 `u8` 像素值; 该枚举用于 API 边界上的穷举匹配
/// 和定量记录的列名.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum TissueClass {
    /// 空气 / 背景.
    Air = label::AIR,

    /// 脂肪.
    Fat = label::FAT,

    /// 肌肉.
    Muscle = label::MUSCLE,

    /// 松质骨.
    TrabecularBone = label::TRAB_BONE,

    /// 皮质骨.
    CorticalBone = label::CORT_BONE,

    /// 高密度皮质骨.
    HyperCorticalBone = label::H_CORT_BONE,

    /// 骨髓.
    BoneMarrow = label::BONE_MARROW,

    /// 皮下脂肪.
    SubcutaneousFat = label::SUB_FAT,

    /// 肌间脂肪.
    IntermuscularFat = label::IM_FAT,

    /// 4% 部位骨区域.
    Bone4Pct = label::BONE_4PCT,

    /// 4% 骨区域最内侧 50%.
    Bone4Pct50 = label::BONE_4PCT_50PCT,

    /// 4% 骨区域最内侧 10%.
    Bone4Pct10 = label::BONE_4PCT_10PCT,

    /// 前景总截面.
    TotalArea = label::TOT_AREA,
}

impl TissueClass {
    /// 从像素值构建. 超出组织编码范围时返回 `None`.
    pub const fn from_label(p: u8) -> Option<TissueClass> {
        Some(match p {
            label::AIR => Self::Air,
            label::FAT => Self::Fat,
            label::MUSCLE => Self::Muscle,
            label::TRAB_BONE => Self::TrabecularBone,
            label::CORT_BONE => Self::CorticalBone,
            label::H_CORT_BONE => Self::HyperCorticalBone,
            label::BONE_MARROW => Self::BoneMarrow,
            label::SUB_FAT => Self::SubcutaneousFat,
            label::IM_FAT => Self::IntermuscularFat,
            label::BONE_4PCT => Self::Bone4Pct,
            label::BONE_4PCT_50PCT => Self::Bone4Pct50,
            label::BONE_4PCT_10PCT => Self::Bone4Pct10,
            label::TOT_AREA => Self::TotalArea,
            _ => return None,
        })
    }

    /// 像素值.
    #[inline]
    pub const fn as_label(self) -> u8 {
        self as u8
    }

    /// 定量记录列名中使用的短名称.
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::Air => "AIR",
            Self::Fat => "FAT",
            Self::Muscle => "MUSCLE",
            Self::TrabecularBone => "TRAB_BO",
            Self::CorticalBone => "COR_BO",
            Self::HyperCorticalBone => "H_CORT_BONE",
            Self::BoneMarrow => "BO_INT",
            Self::SubcutaneousFat => "SUB_FA",
            Self::IntermuscularFat => "IM_FA",
            Self::Bone4Pct => "BO_4%",
            Self::Bone4Pct50 => "BO_4%50%",
            Self::Bone4Pct10 => "BO_4%10%",
            Self::TotalArea => "TOT_AR",
        }
    }
}

/// 定量表格的浮点精度 (小数位).
pub const FLOAT_PRECISION: usize = 3;

/// 定量表格的列宽.
pub const COLUMN_WIDTH: usize = 26;

/// 肢体选择时, 低于该物理面积 (mm^2) 的区域不参与比较.
pub const LEG_PHYSICAL_SIZE_THRESHOLD: f64 = 500.0;

/// 肢体选择后, 裁剪包围盒向外扩展的像素数.
pub const PADDING_LENGTH: usize = 2;

/// 形态学修正使用的圆盘结构元半径 (像素).
pub const STRUCTURE_ELEMENT_RADIUS: usize = 2;

/// k-means 迭代次数上限.
pub const KMEANS_MAX_ITERATIONS: u32 = 200;

/// 各向异性扩散迭代次数.
pub const DIFFUSION_ITERATIONS: u32 = 20;

/// 各向异性扩散时间步长.
pub const DIFFUSION_TIME_STEP: f64 = 0.0325;

/// 各向异性扩散传导系数.
pub const DIFFUSION_CONDUCTANCE: f64 = 2.0;

/// 肌肉/肌间脂肪二次重聚类的默认先验均值.
pub const MUSCLE_IMFAT_PRIOR_MEANS: [f32; 2] = [-20.0, 50.0];
